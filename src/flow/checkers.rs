//! Input checkers: named strategies for judging player answers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rand::RngExt;
use serde_json::Value;

/// A named answer strategy.
///
/// `pick` chooses a correct answer from a limit set when the specification
/// leaves it open; `is_correct` judges a submitted answer.
pub trait InputChecker: Send + Sync {
    fn pick(&self, limits: &[Value]) -> Value;
    fn is_correct(&self, submitted: &str, correct: &Value) -> bool;
}

/// Checkers registered under the input `type` they judge.
#[derive(Default)]
pub struct CheckerRegistry {
    checkers: RwLock<HashMap<String, Arc<dyn InputChecker>>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, checker: Arc<dyn InputChecker>) {
        self.checkers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), checker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn InputChecker>> {
        self.checkers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// The built-in `text` checker: uniform pick, string equality.
pub struct TextChecker;

impl InputChecker for TextChecker {
    fn pick(&self, limits: &[Value]) -> Value {
        if limits.is_empty() {
            return Value::Null;
        }
        let mut rng = rand::rng();
        let index = rng.random_range(0..limits.len());
        limits[index].clone()
    }

    fn is_correct(&self, submitted: &str, correct: &Value) -> bool {
        correct.as_str().is_some_and(|correct| correct == submitted)
    }
}
