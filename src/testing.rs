//! Scripted in-memory server for tests
//!
//! Rules map a SQL fragment (optionally scoped to one database) to a canned
//! response. Later rules take precedence over earlier ones, and rules scoped
//! to the current database over unscoped ones. Unmatched queries return no
//! rows.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::gateway::{Connector, DriverError, QueryGateway, Row};

enum Response {
    Rows(Vec<Row>),
    Fail(String),
}

struct Rule {
    database: Option<String>,
    needle: String,
    response: Response,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    inaccessible: Vec<String>,
    /// database -> message for statements run through `execute`
    execute_failures: Vec<(String, String)>,
    opened: usize,
    live: usize,
    executed: Vec<String>,
    queries: Vec<(Option<String>, String)>,
}

#[derive(Clone, Default)]
pub struct MockServer {
    state: Rc<RefCell<State>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse connections to `database`
    pub fn inaccessible(self, database: &str) -> Self {
        self.state
            .borrow_mut()
            .inaccessible
            .push(database.to_string());
        self
    }

    /// Answer any query containing `needle` with `rows`
    pub fn on(self, needle: &str, rows: Vec<Value>) -> Self {
        self.rule(None, needle, Response::Rows(rows.into_iter().map(to_row).collect()))
    }

    /// Like `on`, but only while connected to `database`
    pub fn on_database(self, database: &str, needle: &str, rows: Vec<Value>) -> Self {
        self.rule(
            Some(database),
            needle,
            Response::Rows(rows.into_iter().map(to_row).collect()),
        )
    }

    /// Fail every statement run through `execute` (`SET ROLE`) while
    /// connected to `database`
    pub fn fail_execute(self, database: &str, message: &str) -> Self {
        self.state
            .borrow_mut()
            .execute_failures
            .push((database.to_string(), message.to_string()));
        self
    }

    /// Fail any query containing `needle`
    pub fn fail(self, needle: &str, message: &str) -> Self {
        self.rule(None, needle, Response::Fail(message.to_string()))
    }

    fn rule(self, database: Option<&str>, needle: &str, response: Response) -> Self {
        self.state.borrow_mut().rules.push(Rule {
            database: database.map(str::to_string),
            needle: needle.to_string(),
            response,
        });
        self
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(MockConnector {
            state: Rc::clone(&self.state),
        })
    }

    /// Successful connection opens so far
    pub fn opened(&self) -> usize {
        self.state.borrow().opened
    }

    /// Connections currently open
    pub fn live_connections(&self) -> usize {
        self.state.borrow().live
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.borrow().executed.clone()
    }

    /// Queries run while connected to `database` (`None` = default database)
    pub fn queries_on(&self, database: Option<&str>) -> Vec<String> {
        self.state
            .borrow()
            .queries
            .iter()
            .filter(|(db, _)| db.as_deref() == database)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.state.borrow().queries.len()
    }
}

fn to_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("mock rows must be JSON objects, got {}", other),
    }
}

struct MockConnector {
    state: Rc<RefCell<State>>,
}

impl Connector for MockConnector {
    fn connect(&mut self, database: Option<&str>) -> Result<Box<dyn QueryGateway>, DriverError> {
        let mut state = self.state.borrow_mut();
        if let Some(db) = database {
            if state.inaccessible.iter().any(|d| d == db) {
                return Err(DriverError(format!(
                    "FATAL: permission denied for database \"{}\"",
                    db
                )));
            }
        }

        state.opened += 1;
        state.live += 1;
        Ok(Box::new(MockGateway {
            state: Rc::clone(&self.state),
            database: database.map(str::to_string),
        }))
    }
}

struct MockGateway {
    state: Rc<RefCell<State>>,
    database: Option<String>,
}

impl QueryGateway for MockGateway {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, DriverError> {
        let mut state = self.state.borrow_mut();
        state.queries.push((self.database.clone(), sql.to_string()));

        let scoped = state.rules.iter().rev().find(|rule| {
            rule.database.is_some() && rule.database == self.database && sql.contains(&rule.needle)
        });
        let rule = scoped.or_else(|| {
            state
                .rules
                .iter()
                .rev()
                .find(|rule| rule.database.is_none() && sql.contains(&rule.needle))
        });

        match rule.map(|r| &r.response) {
            Some(Response::Rows(rows)) => Ok(rows.clone()),
            Some(Response::Fail(message)) => Err(DriverError(message.clone())),
            None => Ok(Vec::new()),
        }
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.executed.push(sql.to_string());

        let failure = state
            .execute_failures
            .iter()
            .find(|(db, _)| Some(db.as_str()) == self.database.as_deref());
        match failure {
            Some((_, message)) => Err(DriverError(message.clone())),
            None => Ok(()),
        }
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.state.borrow_mut().live -= 1;
    }
}
