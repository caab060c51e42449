use std::collections::HashMap;
use std::sync::Arc;

use crate::activity::{Activity, ActivityHandler, Typed};

/// Maps activity names to handlers.
#[derive(Default, Clone)]
pub struct ActivityRegistry {
  handlers: HashMap<String, Arc<dyn ActivityHandler>>,
}

impl ActivityRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a typed activity under [`Activity::NAME`], replacing any
  /// handler already registered under that name.
  pub fn register<A: Activity>(&mut self, activity: A) -> &mut Self {
    self.register_handler(A::NAME, Arc::new(Typed(activity)))
  }

  /// Register an untyped handler.
  pub fn register_handler(
    &mut self,
    name: impl Into<String>,
    handler: Arc<dyn ActivityHandler>,
  ) -> &mut Self {
    self.handlers.insert(name.into(), handler);
    self
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn ActivityHandler>> {
    self.handlers.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.handlers.contains_key(name)
  }

  /// Registered names, sorted.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

impl std::fmt::Debug for ActivityRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActivityRegistry")
      .field("activities", &self.names())
      .finish()
  }
}
