use rev_core::error::{ToolError, ToolErrorKind};
use rev_core::verification::VerificationResult;

/// Fold a verification failure into the tool-error taxonomy so the
/// per-kind recovery budget can be charged. The message is checked
/// before the details.
pub fn classify_verification_failure(vr: &VerificationResult) -> ToolErrorKind {
    let details: Vec<(String, String)> = vr
        .details
        .iter()
        .map(|(k, v)| {
            let rendered = match v.as_str() {
                Some(s) => s.to_string(),
                None => v.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect();
    let detail_refs: Vec<(&str, &str)> = details
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    ToolError::classify("verify", &vr.message, &detail_refs).kind
}
