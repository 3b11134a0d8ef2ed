// Shared page layout, flash messages and error redirects for the HTML routes
use axum::response::{Html, Redirect};
use serde::Deserialize;

use crate::error::WorkflowError;

const STYLE: &str = r#"
        * { box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.6;
            color: #e8e8e8;
            background: linear-gradient(135deg, #1a1a2e 0%, #16213e 50%, #0f1419 100%);
            min-height: 100vh;
            margin: 0;
        }
        .container { max-width: 860px; margin: 0 auto; padding: 32px 20px; }
        h1 { margin-top: 0; }
        a { color: #7fb3ff; }
        .card { background: rgba(26, 26, 46, 0.9); border-radius: 12px; padding: 24px; margin: 20px 0; }
        label { display: block; margin: 14px 0 6px; font-weight: 600; }
        input[type=text], input[type=password], input[type=number], input[type=url], textarea {
            width: 100%; padding: 10px; border-radius: 6px; border: 1px solid #3a3a5a;
            background: #0f1419; color: #e8e8e8;
        }
        textarea { min-height: 120px; }
        button, .button {
            display: inline-block; background-color: #007bff; color: white; padding: 10px 20px;
            border: none; border-radius: 6px; cursor: pointer; text-decoration: none; margin-top: 16px;
        }
        button:hover, .button:hover { background-color: #0056b3; }
        .flash { padding: 12px 16px; border-radius: 6px; margin-bottom: 16px; }
        .flash.error { background: #5a1e1e; color: #ffb3b3; }
        .flash.success { background: #1e5a2e; color: #b3ffc6; }
        .prompt { background: #0f1419; padding: 12px; border-radius: 6px; white-space: pre-wrap; }
        .done { color: #6fdc8c; }
        .pending { color: #aaa; }
        img.preview { max-width: 100%; border-radius: 8px; margin-top: 10px; }
        ol li { margin: 10px 0; }
"#;

/// `?error=` / `?success=` query parameters carried across redirects
#[derive(Debug, Default, Deserialize)]
pub struct Flash {
    pub error: Option<String>,
    pub success: Option<String>,
}

impl Flash {
    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(message) = self.error.as_deref().filter(|m| !m.is_empty()) {
            out.push_str(&format!(r#"<div class="flash error">{}</div>"#, escape_html(message)));
        }
        if let Some(message) = self.success.as_deref().filter(|m| !m.is_empty()) {
            out.push_str(&format!(r#"<div class="flash success">{}</div>"#, escape_html(message)));
        }
        out
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn page(title: &str, flash: &Flash, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - ClipChain</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <h1>🎬 {title}</h1>
        {flash}
        {body}
    </div>
</body>
</html>"#,
        title = escape_html(title),
        style = STYLE,
        flash = flash.render(),
        body = body,
    ))
}

pub fn redirect_error(path: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?error={}", path, urlencoding::encode(message)))
}

pub fn redirect_success(path: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?success={}", path, urlencoding::encode(message)))
}

pub fn plan_path(session_id: &str) -> String {
    format!("/plan/{}", session_id)
}

pub fn step_path(session_id: &str, step: usize) -> String {
    format!("/step/{}/{}", session_id, step)
}

pub fn combine_path(session_id: &str) -> String {
    format!("/combine/{}", session_id)
}

/// Unknown sessions go home; ordering problems go to the plan; everything
/// else returns to `fallback`.
pub fn workflow_redirect(err: &WorkflowError, session_id: &str, fallback: &str) -> Redirect {
    match err {
        WorkflowError::SessionNotFound(_) => redirect_error("/", "Session not found"),
        WorkflowError::InvalidStep { .. }
        | WorkflowError::StepNotReady { .. }
        | WorkflowError::Incomplete { .. } => redirect_error(&plan_path(session_id), &err.to_string()),
        _ => {
            tracing::error!("Workflow error for session {}: {}", session_id, err);
            redirect_error(fallback, &err.to_string())
        }
    }
}
