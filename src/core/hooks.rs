/// Ledger extension points
///
/// Callbacks run synchronously in registration order. `before` callbacks get
/// the value by ownership and either pass a (possibly modified) copy on or
/// short-circuit the operation with a final result.

use super::ledger::AddOutcome;
use super::record::{BackupRow, NewBackup};

pub enum HookFlow<T, R> {
    Proceed(T),
    Return(R),
}

type ListHook = Box<dyn Fn(Vec<BackupRow>) -> Vec<BackupRow> + Send + Sync>;
type AddBeforeHook = Box<dyn Fn(NewBackup) -> HookFlow<NewBackup, AddOutcome> + Send + Sync>;
type AddAfterHook = Box<dyn Fn(&NewBackup, &AddOutcome) + Send + Sync>;
type DeleteBeforeHook = Box<dyn Fn(i64) -> HookFlow<i64, bool> + Send + Sync>;
type DeleteAfterHook = Box<dyn Fn(i64, bool) + Send + Sync>;

#[derive(Default)]
pub struct LedgerHooks {
    list: Vec<ListHook>,
    add_before: Vec<AddBeforeHook>,
    add_after: Vec<AddAfterHook>,
    delete_before: Vec<DeleteBeforeHook>,
    delete_after: Vec<DeleteAfterHook>,
}

impl LedgerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_list<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<BackupRow>) -> Vec<BackupRow> + Send + Sync + 'static,
    {
        self.list.push(Box::new(f));
        self
    }

    pub fn on_add_before<F>(mut self, f: F) -> Self
    where
        F: Fn(NewBackup) -> HookFlow<NewBackup, AddOutcome> + Send + Sync + 'static,
    {
        self.add_before.push(Box::new(f));
        self
    }

    pub fn on_add_after<F>(mut self, f: F) -> Self
    where
        F: Fn(&NewBackup, &AddOutcome) + Send + Sync + 'static,
    {
        self.add_after.push(Box::new(f));
        self
    }

    pub fn on_delete_before<F>(mut self, f: F) -> Self
    where
        F: Fn(i64) -> HookFlow<i64, bool> + Send + Sync + 'static,
    {
        self.delete_before.push(Box::new(f));
        self
    }

    pub fn on_delete_after<F>(mut self, f: F) -> Self
    where
        F: Fn(i64, bool) + Send + Sync + 'static,
    {
        self.delete_after.push(Box::new(f));
        self
    }

    pub(crate) fn run_list(&self, rows: Vec<BackupRow>) -> Vec<BackupRow> {
        self.list.iter().fold(rows, |rows, hook| hook(rows))
    }

    pub(crate) fn run_add_before(&self, mut data: NewBackup) -> HookFlow<NewBackup, AddOutcome> {
        for hook in &self.add_before {
            match hook(data) {
                HookFlow::Proceed(next) => data = next,
                HookFlow::Return(result) => return HookFlow::Return(result),
            }
        }
        HookFlow::Proceed(data)
    }

    pub(crate) fn run_add_after(&self, data: &NewBackup, outcome: &AddOutcome) {
        for hook in &self.add_after {
            hook(data, outcome);
        }
    }

    pub(crate) fn run_delete_before(&self, mut backup_id: i64) -> HookFlow<i64, bool> {
        for hook in &self.delete_before {
            match hook(backup_id) {
                HookFlow::Proceed(next) => backup_id = next,
                HookFlow::Return(result) => return HookFlow::Return(result),
            }
        }
        HookFlow::Proceed(backup_id)
    }

    pub(crate) fn run_delete_after(&self, backup_id: i64, deleted: bool) {
        for hook in &self.delete_after {
            hook(backup_id, deleted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_add_before_chain_and_short_circuit() {
        let hooks = LedgerHooks::new()
            .on_add_before(|mut data| {
                data.name.push_str(" (checked)");
                HookFlow::Proceed(data)
            })
            .on_add_before(|data| {
                if data.id == "blocked" {
                    HookFlow::Return(AddOutcome::Skipped)
                } else {
                    HookFlow::Proceed(data)
                }
            });

        let data = NewBackup {
            name: "Module A".into(),
            id: "mod_a".into(),
            ..Default::default()
        };
        match hooks.run_add_before(data) {
            HookFlow::Proceed(data) => assert_eq!(data.name, "Module A (checked)"),
            HookFlow::Return(_) => panic!("should not short-circuit"),
        }

        let blocked = NewBackup {
            id: "blocked".into(),
            ..Default::default()
        };
        assert!(matches!(
            hooks.run_add_before(blocked),
            HookFlow::Return(AddOutcome::Skipped)
        ));
    }

    #[test]
    fn test_after_hooks_run_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let first = calls.clone();
        let second = calls.clone();

        let hooks = LedgerHooks::new()
            .on_delete_after(move |_, _| {
                assert_eq!(first.fetch_add(1, Ordering::SeqCst), 0);
            })
            .on_delete_after(move |_, _| {
                assert_eq!(second.fetch_add(1, Ordering::SeqCst), 1);
            });

        hooks.run_delete_after(1, true);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
