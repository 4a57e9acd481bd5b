//! Interactive prompts with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{CachePipeError, CachePipeResult};

/// Ask a yes/no question.
///
/// Auto-yes answers `true`; a non-interactive session gets `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> CachePipeResult<bool> {
    if ctx.auto_yes() {
        println!("  {} (auto-approved)", message);
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on terminal input
    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| CachePipeError::Internal(format!("Prompt task failed: {}", e)))?;

    result.map_err(|e| CachePipeError::io("reading confirmation", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_interactive_uses_default() {
        let ctx = UiContext::non_interactive();
        assert!(!confirm(&ctx, "Overwrite?", false).await.unwrap());
        assert!(confirm(&ctx, "Overwrite?", true).await.unwrap());
    }

    #[tokio::test]
    async fn auto_yes_approves() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(confirm(&ctx, "Overwrite?", false).await.unwrap());
    }
}
