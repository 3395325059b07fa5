use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{or_empty, CollectContext, Collector};
use crate::connection::ConnectionManager;
use crate::decode::value_in_bytes;
use crate::error::InfoError;
use crate::input::quote_ident;
use crate::snapshot::{SettingEntry, SubsetData};

const SETTINGS_QUERY: &str = "SELECT name, setting, unit, context, vartype, \
     boot_val, min_val, max_val, sourcefile \
     FROM pg_catalog.pg_settings";

const SETTINGS_WITH_PENDING_QUERY: &str = "SELECT name, setting, unit, context, vartype, \
     boot_val, min_val, max_val, sourcefile, pending_restart \
     FROM pg_catalog.pg_settings";

/// Run-time parameters from `pg_settings`
pub struct SettingsCollector;

impl Collector for SettingsCollector {
    fn collect(&self, ctx: &mut CollectContext<'_>) -> Result<SubsetData, InfoError> {
        #[derive(Deserialize)]
        struct SettingRow {
            name: String,
            setting: Option<String>,
            unit: Option<String>,
            context: Option<String>,
            vartype: Option<String>,
            boot_val: Option<String>,
            min_val: Option<String>,
            max_val: Option<String>,
            sourcefile: Option<String>,
            #[serde(default)]
            pending_restart: Option<bool>,
        }

        let with_pending = ctx.capabilities.settings_pending_restart;
        let sql = if with_pending {
            SETTINGS_WITH_PENDING_QUERY
        } else {
            SETTINGS_QUERY
        };

        let rows: Vec<SettingRow> = ctx.connections.fetch(sql)?;
        debug!(count = ?rows.len(), "Found settings");

        let mut settings = BTreeMap::new();
        let mut pending_restart = Vec::new();

        for row in rows {
            let setting = or_empty(row.setting);
            let unit = or_empty(row.unit);
            let pretty_val = pretty_value(ctx.connections, &row.name)?;

            // Column absent on old servers; a null there is reported as false
            let pending = with_pending.then(|| row.pending_restart.unwrap_or(false));
            if pending == Some(true) {
                pending_restart.push(row.name.clone());
            }

            let entry = SettingEntry {
                val_in_bytes: value_in_bytes(&setting, &unit),
                setting,
                unit,
                context: or_empty(row.context),
                vartype: or_empty(row.vartype),
                boot_val: or_empty(row.boot_val),
                min_val: or_empty(row.min_val),
                max_val: or_empty(row.max_val),
                sourcefile: or_empty(row.sourcefile),
                pretty_val,
                pending_restart: pending,
            };
            settings.insert(row.name, entry);
        }

        if !pending_restart.is_empty() {
            debug!(settings = ?pending_restart, "Settings pending restart");
        }

        Ok(SubsetData::Settings {
            settings,
            pending_restart,
        })
    }
}

/// The value as `SHOW` renders it, units included
fn pretty_value(connections: &mut ConnectionManager, name: &str) -> Result<String, InfoError> {
    let sql = format!("SHOW {}", quote_ident(name));
    let rows = connections.query(&sql)?;

    let value = rows
        .into_iter()
        .next()
        .and_then(|row| row.into_iter().next().map(|(_, value)| value));

    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ServerCapabilities;
    use crate::catalog::Subset;
    use crate::collect::tests::run_collector;
    use crate::testing::MockServer;
    use serde_json::json;

    fn server() -> MockServer {
        MockServer::new()
            .on(
                "pg_settings",
                vec![
                    json!({"name": "shared_buffers", "setting": "16384", "unit": "8kB",
                           "context": "postmaster", "vartype": "integer", "boot_val": "1024",
                           "min_val": "16", "max_val": "1073741823", "sourcefile": null,
                           "pending_restart": true}),
                    json!({"name": "work_mem", "setting": "4096", "unit": "kB",
                           "context": "user", "vartype": "integer", "boot_val": "4096",
                           "min_val": "64", "max_val": "2147483647", "sourcefile": null,
                           "pending_restart": false}),
                    json!({"name": "application_name", "setting": "psql", "unit": null,
                           "context": "user", "vartype": "string", "boot_val": "",
                           "min_val": null, "max_val": null, "sourcefile": null,
                           "pending_restart": false}),
                ],
            )
            .on("SHOW \"shared_buffers\"", vec![json!({"shared_buffers": "128MB"})])
            .on("SHOW \"work_mem\"", vec![json!({"work_mem": "4MB"})])
            .on(
                "SHOW \"application_name\"",
                vec![json!({"application_name": "psql"})],
            )
    }

    #[test]
    fn test_settings_decoded() {
        let caps = ServerCapabilities {
            settings_pending_restart: true,
            ..Default::default()
        };
        let server = server();

        let SubsetData::Settings {
            settings,
            pending_restart,
        } = run_collector(Subset::Settings, &server, &caps).unwrap()
        else {
            panic!("expected settings");
        };

        let work_mem = &settings["work_mem"];
        assert_eq!(work_mem.val_in_bytes, Some(4194304));
        assert_eq!(work_mem.pretty_val, "4MB");
        assert_eq!(work_mem.sourcefile, "");
        assert_eq!(work_mem.pending_restart, Some(false));

        assert_eq!(settings["shared_buffers"].val_in_bytes, Some(134217728));

        let app = &settings["application_name"];
        assert_eq!(app.unit, "");
        assert_eq!(app.min_val, "");
        assert_eq!(app.val_in_bytes, None);

        assert_eq!(pending_restart, vec!["shared_buffers"]);
    }

    #[test]
    fn test_pending_restart_column_missing() {
        let server = server();

        let SubsetData::Settings {
            settings,
            pending_restart,
        } = run_collector(Subset::Settings, &server, &ServerCapabilities::default()).unwrap()
        else {
            panic!("expected settings");
        };

        assert!(pending_restart.is_empty());
        assert!(settings.values().all(|s| s.pending_restart.is_none()));
        assert!(!server
            .queries_on(None)
            .iter()
            .any(|q| q.contains("pending_restart")));
    }

    #[test]
    fn test_show_quotes_setting_name() {
        let server = MockServer::new().on(
            "pg_settings",
            vec![json!({"name": "odd\"name", "setting": "1", "unit": null,
                        "context": "user", "vartype": "integer", "boot_val": null,
                        "min_val": null, "max_val": null, "sourcefile": null})],
        );

        run_collector(Subset::Settings, &server, &ServerCapabilities::default()).unwrap();

        assert!(server
            .queries_on(None)
            .contains(&"SHOW \"odd\"\"name\"".to_string()));
    }
}
