//! Subset catalog
//!
//! The fixed, closed set of information categories the collector knows how
//! to gather. Declaration order is collection order.

use std::fmt;

/// One named category of server or database information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subset {
    Version,
    InRecovery,
    Tablespaces,
    Databases,
    Replications,
    ReplSlots,
    Settings,
    Roles,
}

impl Subset {
    /// Every subset, in catalog order
    pub const ALL: [Subset; 8] = [
        Subset::Version,
        Subset::InRecovery,
        Subset::Tablespaces,
        Subset::Databases,
        Subset::Replications,
        Subset::ReplSlots,
        Subset::Settings,
        Subset::Roles,
    ];

    /// Name matched by filter patterns and used as the snapshot key
    pub fn name(self) -> &'static str {
        match self {
            Subset::Version => "version",
            Subset::InRecovery => "in_recovery",
            Subset::Tablespaces => "tablespaces",
            Subset::Databases => "databases",
            Subset::Replications => "replications",
            Subset::ReplSlots => "repl_slots",
            Subset::Settings => "settings",
            Subset::Roles => "roles",
        }
    }

    /// Look up a subset by its catalog name
    pub fn from_name(name: &str) -> Option<Subset> {
        Subset::ALL.into_iter().find(|subset| subset.name() == name)
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
