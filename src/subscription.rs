//! Subscription bookkeeping.
//!
//! The engine replays this table as fresh register calls after every
//! successful reconnect, so it must outlive the connection: entries are
//! only ever removed by an explicit unregister.

use std::collections::BTreeMap;

/// Exact-name and wildcard registrations with their requested minimum
/// update intervals (0 = every change).
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTable {
    exact: BTreeMap<String, f64>,
    wildcard: BTreeMap<(String, String), f64>,
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record an exact-name registration. Idempotent; the first interval
    /// wins.
    pub(crate) fn insert(&mut self, variable: &str, interval: f64) {
        self.exact
            .entry(variable.to_string())
            .or_insert(interval);
    }

    /// Remove an exact-name registration; true if it was present.
    pub(crate) fn remove(&mut self, variable: &str) -> bool {
        self.exact.remove(variable).is_some()
    }

    pub(crate) fn contains(&self, variable: &str) -> bool {
        self.exact.contains_key(variable)
    }

    /// Record a wildcard registration keyed by (variable pattern,
    /// application pattern).
    pub(crate) fn insert_wildcard(&mut self, var_pattern: &str, app_pattern: &str, interval: f64) {
        self.wildcard
            .entry((var_pattern.to_string(), app_pattern.to_string()))
            .or_insert(interval);
    }

    /// Remove a wildcard registration; true if it was present.
    pub(crate) fn remove_wildcard(&mut self, var_pattern: &str, app_pattern: &str) -> bool {
        self.wildcard
            .remove(&(var_pattern.to_string(), app_pattern.to_string()))
            .is_some()
    }

    /// Exact registrations as (variable, interval) pairs.
    pub(crate) fn exact_entries(&self) -> Vec<(String, f64)> {
        self.exact
            .iter()
            .map(|(var, interval)| (var.clone(), *interval))
            .collect()
    }

    /// Wildcard registrations as (variable pattern, application pattern,
    /// interval) triples.
    pub(crate) fn wildcard_entries(&self) -> Vec<(String, String, f64)> {
        self.wildcard
            .iter()
            .map(|((var, app), interval)| (var.clone(), app.clone(), *interval))
            .collect()
    }
}

/// Payload text of a wildcard (un)register message.
pub(crate) fn wildcard_payload(var_pattern: &str, app_pattern: &str, interval: f64) -> String {
    format!("AppPattern={app_pattern},VarPattern={var_pattern},Interval={interval:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut table = SubscriptionTable::new();
        table.insert("DEPLOY", 0.0);
        table.insert("DEPLOY", 5.0);
        assert_eq!(table.exact_entries(), vec![("DEPLOY".to_string(), 0.0)]);
    }

    #[test]
    fn test_remove() {
        let mut table = SubscriptionTable::new();
        table.insert("DEPLOY", 0.0);
        assert!(table.remove("DEPLOY"));
        assert!(!table.remove("DEPLOY"));
        assert!(!table.contains("DEPLOY"));
        assert!(table.exact_entries().is_empty());
    }

    #[test]
    fn test_wildcard_entries() {
        let mut table = SubscriptionTable::new();
        table.insert_wildcard("NODE_REPORT*", "*", 0.0);
        table.insert_wildcard("NODE_REPORT*", "*", 2.0);
        assert_eq!(
            table.wildcard_entries(),
            vec![("NODE_REPORT*".to_string(), "*".to_string(), 0.0)]
        );
        assert!(table.remove_wildcard("NODE_REPORT*", "*"));
        assert!(!table.remove_wildcard("NODE_REPORT*", "*"));
    }

    #[test]
    fn test_wildcard_payload_format() {
        assert_eq!(
            wildcard_payload("NODE_REPORT*", "*", 0.0),
            "AppPattern=*,VarPattern=NODE_REPORT*,Interval=0.0"
        );
        assert_eq!(
            wildcard_payload("X", "app", 1.5),
            "AppPattern=app,VarPattern=X,Interval=1.5"
        );
    }
}
