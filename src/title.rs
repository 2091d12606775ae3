#![forbid(unsafe_code)]

use crate::runner::CommandRunner;

pub fn title_args(item_url: &str) -> Vec<String> {
    vec![
        "--get-title".to_string(),
        "--no-warnings".to_string(),
        item_url.to_string(),
    ]
}

/// Asks the fetcher for the display title of one item. `None` when the
/// lookup fails or prints nothing; there is no retry because a missing title
/// is usually permanent (private or deleted video).
pub async fn resolve_title(
    runner: &dyn CommandRunner,
    fetcher: &str,
    item_url: &str,
) -> Option<String> {
    let output = runner.run(fetcher, &title_args(item_url)).await;
    if !output.success {
        tracing::debug!(item_url, error = %output.error_text(), "title lookup failed");
        return None;
    }
    let title = output.stdout.trim();
    if title.is_empty() {
        return None;
    }
    Some(title.to_string())
}
