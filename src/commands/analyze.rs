//! Analysis Commands

use crate::models::response::CommandResponse;
use crate::services::audit::AnalyzeOptions;
use crate::state::AppState;
use webaudit_core::ProgressSink;
use webaudit_pipeline::AggregateResult;

/// Run one analysis through the audit service
pub async fn analyze_url(
    state: &AppState,
    url: &str,
    options: AnalyzeOptions,
    sink: &dyn ProgressSink,
) -> CommandResponse<AggregateResult> {
    match state.audit().await {
        Ok(audit) => audit.analyze(url, options, sink).await.into(),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}
