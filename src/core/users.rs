/// User directory seam: owner display names and the acting user

use std::collections::HashMap;

#[cfg_attr(test, mockall::automock)]
pub trait UserDirectory: Send + Sync {
    /// Id of the user performing the current operation
    fn current_user_id(&self) -> i64;

    /// Display name for a user id, `None` when unknown or deleted
    fn display_name(&self, user_id: i64) -> Option<String>;
}

/// Directory backed by the `[users]` table of the app config
#[derive(Debug, Clone, Default)]
pub struct StaticUsers {
    acting_user_id: i64,
    names: HashMap<i64, String>,
}

impl StaticUsers {
    pub fn new(acting_user_id: i64, names: HashMap<i64, String>) -> Self {
        Self {
            acting_user_id,
            names,
        }
    }
}

impl UserDirectory for StaticUsers {
    fn current_user_id(&self) -> i64 {
        self.acting_user_id
    }

    fn display_name(&self, user_id: i64) -> Option<String> {
        self.names.get(&user_id).cloned()
    }
}
