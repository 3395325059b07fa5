//! Snapshot data structures
//!
//! These types are the result of a collection run and form the contract
//! between the collectors (produce) and report rendering (consumes).
//! Registries are `BTreeMap`s so two runs against an unchanged server
//! serialize identically.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::catalog::Subset;
use crate::decode::{ExtensionVersion, ServerVersion};

/// Catalog row rendered with whatever columns the server exposes
pub type CatalogRecord = BTreeMap<String, Value>;

/// Error recorded on a database entry whose connection could not be opened
pub const UNREACHABLE_DATABASE: &str = "Could not connect to the database.";

/// Everything collected in one run. Subsets that were not selected are `None`
/// and left out of the serialized output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<ServerVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_recovery: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tablespaces: Option<BTreeMap<String, TablespaceEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub databases: Option<BTreeMap<String, DatabaseEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replications: Option<BTreeMap<i32, ReplicationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repl_slots: Option<BTreeMap<String, ReplSlotEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<BTreeMap<String, SettingEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<BTreeMap<String, RoleEntry>>,
    /// Names of settings changed in the configuration but awaiting a restart
    pub pending_restart_settings: Vec<String>,
}

impl Snapshot {
    /// Fold one collector's output into the snapshot
    pub fn insert(&mut self, data: SubsetData) {
        match data {
            SubsetData::Version(v) => self.version = Some(v),
            SubsetData::InRecovery(v) => self.in_recovery = Some(v),
            SubsetData::Tablespaces(v) => self.tablespaces = Some(v),
            SubsetData::Databases(v) => self.databases = Some(v),
            SubsetData::Replications(v) => self.replications = Some(v),
            SubsetData::ReplSlots(v) => self.repl_slots = Some(v),
            SubsetData::Settings {
                settings,
                pending_restart,
            } => {
                self.settings = Some(settings);
                self.pending_restart_settings = pending_restart;
            }
            SubsetData::Roles(v) => self.roles = Some(v),
        }
    }

    /// Subsets present in this snapshot, in catalog order
    pub fn collected(&self) -> Vec<Subset> {
        Subset::ALL
            .into_iter()
            .filter(|subset| match subset {
                Subset::Version => self.version.is_some(),
                Subset::InRecovery => self.in_recovery.is_some(),
                Subset::Tablespaces => self.tablespaces.is_some(),
                Subset::Databases => self.databases.is_some(),
                Subset::Replications => self.replications.is_some(),
                Subset::ReplSlots => self.repl_slots.is_some(),
                Subset::Settings => self.settings.is_some(),
                Subset::Roles => self.roles.is_some(),
            })
            .collect()
    }
}

/// Output of a single collector
#[derive(Debug, Clone, PartialEq)]
pub enum SubsetData {
    Version(ServerVersion),
    InRecovery(bool),
    Tablespaces(BTreeMap<String, TablespaceEntry>),
    Databases(BTreeMap<String, DatabaseEntry>),
    Replications(BTreeMap<i32, ReplicationEntry>),
    ReplSlots(BTreeMap<String, ReplSlotEntry>),
    Settings {
        settings: BTreeMap<String, SettingEntry>,
        pending_restart: Vec<String>,
    },
    Roles(BTreeMap<String, RoleEntry>),
}

impl SubsetData {
    pub fn subset(&self) -> Subset {
        match self {
            SubsetData::Version(_) => Subset::Version,
            SubsetData::InRecovery(_) => Subset::InRecovery,
            SubsetData::Tablespaces(_) => Subset::Tablespaces,
            SubsetData::Databases(_) => Subset::Databases,
            SubsetData::Replications(_) => Subset::Replications,
            SubsetData::ReplSlots(_) => Subset::ReplSlots,
            SubsetData::Settings { .. } => Subset::Settings,
            SubsetData::Roles(_) => Subset::Roles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablespaceEntry {
    pub spcowner: String,
    pub spcacl: String,
    /// Only reported when the server has `pg_tablespace.spcoptions`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spcoptions: Option<Vec<String>>,
}

/// One database visited during traversal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseEntry {
    pub owner: String,
    pub encoding: String,
    pub collate: String,
    pub ctype: String,
    pub access_priv: String,
    /// Bytes as text, or `No Access`
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icu_locale: Option<String>,
    pub namespaces: BTreeMap<String, NamespaceEntry>,
    pub extensions: BTreeMap<String, ExtensionEntry>,
    pub languages: BTreeMap<String, LanguageEntry>,
    /// Servers 10 and later only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publications: Option<BTreeMap<String, CatalogRecord>>,
    /// Servers 10 and later only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriptions: Option<BTreeMap<String, CatalogRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatabaseEntry {
    /// Mark the entry as unreachable: registries emptied, error recorded
    pub fn mark_unreachable(&mut self, logical_replication: bool) {
        self.namespaces.clear();
        self.extensions.clear();
        self.languages.clear();
        if logical_replication {
            self.publications = Some(BTreeMap::new());
            self.subscriptions = Some(BTreeMap::new());
        }
        self.error = Some(UNREACHABLE_DATABASE.to_string());
    }

    pub fn is_reachable(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceEntry {
    pub nspowner: String,
    pub nspacl: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionEntry {
    pub extversion: ExtensionVersion,
    pub nspname: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageEntry {
    pub lanowner: String,
    pub lanacl: String,
}

/// A WAL sender, keyed by its backend pid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicationEntry {
    pub usename: String,
    pub app_name: String,
    /// `None` for Unix socket connections
    pub client_addr: Option<String>,
    pub client_hostname: String,
    pub backend_start: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplSlotEntry {
    pub plugin: Option<String>,
    pub slot_type: Option<String>,
    pub database: Option<String>,
    pub active: bool,
}

/// A run-time server parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingEntry {
    pub setting: String,
    pub unit: String,
    pub context: String,
    pub vartype: String,
    pub boot_val: String,
    pub min_val: String,
    pub max_val: String,
    pub sourcefile: String,
    /// The value as `SHOW` prints it
    pub pretty_val: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_in_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_restart: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleEntry {
    pub superuser: bool,
    pub canlogin: bool,
    pub valid_until: String,
    pub member_of: Vec<String>,
}
