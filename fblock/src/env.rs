// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Bootloader environment variables. The engine only ever reads them; the
//! variables themselves (`confirm_user_unlock`, `confirm_user_to`, and the
//! getvar fallthrough namespace) are provisioned elsewhere.

use std::collections::HashMap;

pub trait Environment {
    fn get(&self, name: &str) -> Option<String>;

    /// Interpret a variable as a boolean flag. Unset or non-numeric values
    /// are false.
    fn get_flag(&self, name: &str) -> bool {
        self.get(name)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .is_some_and(|v| v != 0)
    }
}

/// Environment backed by the host process environment.
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        // Inherent HashMap::get, not a recursive call.
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing() {
        let mut env = HashMap::new();
        env.insert("a".to_owned(), "1".to_owned());
        env.insert("b".to_owned(), "0".to_owned());
        env.insert("c".to_owned(), "yes".to_owned());

        assert!(Environment::get_flag(&env, "a"));
        assert!(!Environment::get_flag(&env, "b"));
        assert!(!Environment::get_flag(&env, "c"));
        assert!(!Environment::get_flag(&env, "missing"));
    }
}
