/// Permission grants for the admin surfaces

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::utils::{PERMISSION_ACCESS, PERMISSION_DELETE, PERMISSION_DOWNLOAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// View the backup list
    Backup,
    BackupDelete,
    BackupDownload,
}

impl Permission {
    pub const ALL: [Permission; 3] = [
        Permission::Backup,
        Permission::BackupDelete,
        Permission::BackupDownload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Backup => PERMISSION_ACCESS,
            Permission::BackupDelete => PERMISSION_DELETE,
            Permission::BackupDownload => PERMISSION_DOWNLOAD,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

/// Set of permissions held by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants {
    permissions: HashSet<Permission>,
}

impl Grants {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            permissions: Permission::ALL.into_iter().collect(),
        }
    }

    /// Build grants from permission names, ignoring unknown names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            permissions: names
                .into_iter()
                .filter_map(|n| Permission::parse(n.as_ref()))
                .collect(),
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}
