use minijinja::{Environment, context};

use crate::error::WorkflowError;

/// Render the opening notification for an instance.
pub(crate) fn render_notification(
  template: &str,
  instance_id: &str,
  target: &str,
) -> Result<String, WorkflowError> {
  let env = Environment::new();
  env
    .render_str(template, context! { instance_id, target })
    .map_err(|e| WorkflowError::Template {
      message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_render_default_shape() {
    let message = render_notification(
      "Received workflow id {{ instance_id }} to perform a vulnerability scan on {{ target }}",
      "abc",
      "nginx:latest",
    )
    .unwrap();
    assert_eq!(
      message,
      "Received workflow id abc to perform a vulnerability scan on nginx:latest"
    );
  }

  #[test]
  fn test_render_syntax_error() {
    let err = render_notification("{{ target", "abc", "nginx").unwrap_err();
    assert!(matches!(err, WorkflowError::Template { .. }));
  }
}
