//! Collection orchestration
//!
//! A run resolves the filter, probes the server once, then walks the subset
//! catalog in order and folds each collector's output into the snapshot.
//! Any fatal error ends the run without a snapshot; the connection is
//! closed on every path.

use std::collections::BTreeSet;

use tracing::{debug, error, info};

use crate::capabilities::ServerCapabilities;
use crate::catalog::Subset;
use crate::collect::{collector_for, CollectContext};
use crate::connection::ConnectionManager;
use crate::error::InfoError;
use crate::filter::SubsetFilter;
use crate::gateway::Connector;
use crate::input::check_input;
use crate::snapshot::Snapshot;

/// Drives one collection run over an open connection
pub struct CollectionOrchestrator {
    connections: ConnectionManager,
}

impl CollectionOrchestrator {
    pub fn new(connections: ConnectionManager) -> Self {
        Self { connections }
    }

    /// Collect every subset selected by `filter`
    pub fn run(mut self, filter: &SubsetFilter) -> Result<Snapshot, InfoError> {
        if filter.is_empty() {
            debug!("No filter given, collecting every subset");
        }
        let selected = filter.resolve(&Subset::ALL);
        info!(
            subsets = ?selected.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Resolved subsets"
        );

        let result = if selected.is_empty() {
            info!("Filter selected no subsets");
            Ok(Snapshot::default())
        } else {
            self.collect(&selected)
        };

        self.connections.close();
        if let Err(e) = &result {
            error!(error = ?e.to_string(), "Collection failed");
        }
        result
    }

    fn collect(&mut self, selected: &BTreeSet<Subset>) -> Result<Snapshot, InfoError> {
        let capabilities = ServerCapabilities::probe(&mut self.connections)?;
        let mut ctx = CollectContext {
            connections: &mut self.connections,
            capabilities: &capabilities,
        };

        let mut snapshot = Snapshot::default();
        for subset in Subset::ALL.into_iter().filter(|s| selected.contains(s)) {
            debug!(subset = ?subset.name(), "Collecting subset");
            let data = collector_for(subset).collect(&mut ctx)?;
            snapshot.insert(data);
            debug!(subset = ?subset.name(), "Subset collected");
        }

        info!(subsets = ?snapshot.collected().len(), "Collection finished");
        Ok(snapshot)
    }
}

/// Options for a single `gather` call
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Filter tokens; a leading `!` excludes
    pub filter: Vec<String>,
    /// Initial database, `None` for the login role's default
    pub database: Option<String>,
    /// Role to `SET ROLE` to after every connect
    pub session_role: Option<String>,
    /// Skip the injection check on free-text input
    pub trust_input: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            filter: Vec::new(),
            database: None,
            session_role: None,
            trust_input: true,
        }
    }
}

/// Connect through `connector` and collect a snapshot
pub fn gather(connector: Box<dyn Connector>, options: &RunOptions) -> Result<Snapshot, InfoError> {
    if !options.trust_input {
        check_input("session_role", options.session_role.as_deref())?;
        for token in &options.filter {
            check_input("filter", Some(token))?;
        }
    }

    let filter = SubsetFilter::parse(&options.filter)?;
    let connections = ConnectionManager::open(
        connector,
        options.database.clone(),
        options.session_role.clone(),
    )?;

    CollectionOrchestrator::new(connections).run(&filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::UNREACHABLE_DATABASE;
    use crate::testing::MockServer;
    use serde_json::{json, Value};

    fn database_row(name: &str) -> Value {
        json!({
            "datname": name, "owner": "postgres", "encoding": "UTF8",
            "datcollate": "en_US.UTF-8", "datctype": "en_US.UTF-8",
            "access_priv": null, "size": "7971311"
        })
    }

    fn server() -> MockServer {
        MockServer::new()
            .on("server_version_num", vec![json!({"server_version_num": "130002"})])
            .on(
                "information_schema.tables",
                vec![
                    json!({"table_name": "pg_extension"}),
                    json!({"table_name": "pg_replication_slots"}),
                    json!({"table_name": "pg_stat_replication"}),
                ],
            )
            .on(
                "version()",
                vec![json!({"version": "PostgreSQL 13.2 on x86_64-pc-linux-gnu"})],
            )
            .on("pg_is_in_recovery", vec![json!({"in_recovery": false})])
            .on(
                "d.datname <> 'template0'",
                vec![database_row("acme"), database_row("locked"), database_row("postgres")],
            )
            .on(
                "FROM pg_catalog.pg_namespace AS n",
                vec![json!({"nspname": "public", "rolname": "postgres", "nspacl": null})],
            )
            .on(
                "pg_auth_members",
                vec![json!({"rolname": "postgres", "rolsuper": true, "rolcanlogin": true,
                            "rolvaliduntil": null, "memberof": []})],
            )
            .inaccessible("locked")
    }

    fn options(filter: &[&str]) -> RunOptions {
        RunOptions {
            filter: filter.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unreachable_database_does_not_abort_run() {
        let server = server();

        let snapshot = gather(server.connector(), &options(&["databases", "roles"])).unwrap();

        let databases = snapshot.databases.as_ref().unwrap();
        assert_eq!(databases.len(), 3);
        assert!(databases["acme"].is_reachable());
        assert!(databases["acme"].namespaces.contains_key("public"));
        assert_eq!(databases["locked"].error.as_deref(), Some(UNREACHABLE_DATABASE));
        assert!(databases["locked"].namespaces.is_empty());
        assert_eq!(databases["locked"].publications, Some(Default::default()));
        assert!(databases["postgres"].is_reachable());

        // roles ran after traversal, on the restored initial connection
        assert!(snapshot.roles.as_ref().unwrap().contains_key("postgres"));
        assert!(server
            .queries_on(None)
            .iter()
            .any(|q| q.contains("pg_auth_members")));
        assert_eq!(snapshot.collected(), vec![Subset::Databases, Subset::Roles]);
        assert_eq!(server.live_connections(), 0);
    }

    #[test]
    fn test_full_run_collects_every_subset() {
        let server = server();

        let snapshot = gather(server.connector(), &RunOptions::default()).unwrap();

        assert_eq!(snapshot.collected(), Subset::ALL.to_vec());
        assert_eq!(snapshot.version.as_ref().unwrap().full, "13.2");
        assert_eq!(snapshot.in_recovery, Some(false));
        assert_eq!(snapshot.replications, Some(Default::default()));
        assert!(snapshot.pending_restart_settings.is_empty());
    }

    #[test]
    fn test_exclude_everything_yields_empty_snapshot() {
        let server = server();

        let snapshot = gather(server.connector(), &options(&["!*"])).unwrap();

        assert_eq!(snapshot, Snapshot::default());
        assert_eq!(server.query_count(), 0);
        assert_eq!(server.live_connections(), 0);
    }

    #[test]
    fn test_includes_ignore_excludes() {
        let server = server();

        let snapshot = gather(server.connector(), &options(&["ver*", "!version"])).unwrap();

        assert_eq!(snapshot.collected(), vec![Subset::Version]);
    }

    #[test]
    fn test_fatal_query_yields_no_snapshot() {
        let server = server().fail("pg_auth_members", "ERROR: permission denied for table pg_authid");

        let err = gather(server.connector(), &options(&["in_recovery", "roles"])).unwrap_err();

        assert!(matches!(err, InfoError::Query { .. }));
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(server.live_connections(), 0);
    }

    #[test]
    fn test_session_role_refused_in_one_database() {
        let server = server().fail_execute("acme", "ERROR: permission denied to set role \"auditor\"");
        let options = RunOptions {
            filter: vec!["databases".to_string()],
            session_role: Some("auditor".to_string()),
            ..Default::default()
        };

        let snapshot = gather(server.connector(), &options).unwrap();

        let databases = snapshot.databases.as_ref().unwrap();
        assert_eq!(databases["acme"].error.as_deref(), Some(UNREACHABLE_DATABASE));
        assert!(databases["acme"].namespaces.is_empty());
        assert_eq!(databases["acme"].publications, Some(Default::default()));
        assert_eq!(databases["acme"].subscriptions, Some(Default::default()));
        assert!(databases["postgres"].namespaces.contains_key("public"));
        assert!(server.queries_on(Some("acme")).is_empty());
        assert_eq!(server.live_connections(), 0);
    }

    #[test]
    fn test_session_role_refused_on_initial_connection() {
        let server = server().fail_execute("postgres", "ERROR: role \"auditor\" does not exist");
        let options = RunOptions {
            database: Some("postgres".to_string()),
            session_role: Some("auditor".to_string()),
            ..Default::default()
        };

        let err = gather(server.connector(), &options).unwrap_err();

        assert!(matches!(err, InfoError::Query { ref statement, .. } if statement == "SET ROLE \"auditor\""));
        assert_eq!(server.query_count(), 0);
        assert_eq!(server.live_connections(), 0);
    }

    #[test]
    fn test_initial_connection_failure_is_fatal() {
        let server = server().inaccessible("nowhere");
        let options = RunOptions {
            database: Some("nowhere".to_string()),
            ..Default::default()
        };

        let err = gather(server.connector(), &options).unwrap_err();

        assert!(matches!(err, InfoError::Connection(_)));
        assert_eq!(server.opened(), 0);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let server = server();

        let first = gather(server.connector(), &RunOptions::default()).unwrap();
        let second = gather(server.connector(), &RunOptions::default()).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_untrusted_input_rejected_before_connecting() {
        let server = server();
        let options = RunOptions {
            session_role: Some("admin\"; DROP ROLE x; --".to_string()),
            trust_input: false,
            ..Default::default()
        };

        let err = gather(server.connector(), &options).unwrap_err();

        assert!(matches!(err, InfoError::InputRejected { .. }));
        assert_eq!(server.opened(), 0);
    }

    #[test]
    fn test_trusted_input_is_not_checked() {
        let server = server();
        let options = RunOptions {
            filter: vec!["in_recovery".to_string()],
            session_role: Some("odd'role".to_string()),
            trust_input: true,
            ..Default::default()
        };

        gather(server.connector(), &options).unwrap();

        assert_eq!(server.executed(), vec!["SET ROLE \"odd'role\""]);
    }

    #[test]
    fn test_session_role_applied_on_every_connection() {
        let server = server();
        let options = RunOptions {
            filter: vec!["databases".to_string()],
            session_role: Some("auditor".to_string()),
            ..Default::default()
        };

        gather(server.connector(), &options).unwrap();

        // initial, acme, postgres, then the restore
        assert_eq!(server.executed().len(), 4);
        assert!(server.executed().iter().all(|sql| sql == "SET ROLE \"auditor\""));
    }
}
