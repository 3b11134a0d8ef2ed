use axum::{
    extract::{Extension, Path, Query},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;

use super::pages::{
    combine_path, escape_html, page, plan_path, step_path, workflow_redirect, Flash,
};
use crate::AppState;

pub fn ui_routes() -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/plan/:session_id", get(plan_page))
        .route("/step/:session_id/:step", get(step_page))
        .route("/combine/:session_id", get(combine_page))
}

/// Scene form: description, clip count, credential and starting image
pub async fn index_page(
    Extension(state): Extension<Arc<AppState>>,
    Query(flash): Query<Flash>,
) -> Html<String> {
    let workflow = &state.workflow;
    let key_hint = if state.config.default_api_key.is_some() {
        "Optional: a server-side key is configured and used when this is empty."
    } else {
        "Required: used once to plan the clip prompts, never stored on disk."
    };

    let body = format!(
        r#"<div class="card">
    <p>Describe a scene, pick a starting image, and ClipChain plans a sequence of clip prompts.
    Generate each clip with your video tool of choice and upload it here; the last frame of each clip
    becomes the starting image of the next one.</p>
    <form action="/create" method="post" enctype="multipart/form-data">
        <label for="openai_api_key">OpenAI API key</label>
        <input type="password" id="openai_api_key" name="openai_api_key" placeholder="sk-...">
        <small>{key_hint}</small>

        <label for="scene_description">Scene description</label>
        <textarea id="scene_description" name="scene_description" required></textarea>

        <label for="num_clips">Number of clips</label>
        <input type="number" id="num_clips" name="num_clips" min="1" max="{max}" value="{default}">

        <label for="starting_image_file">Starting image (JPG or PNG)</label>
        <input type="file" id="starting_image_file" name="starting_image_file" accept=".jpg,.jpeg,.png">

        <label for="starting_image_url">...or image URL</label>
        <input type="url" id="starting_image_url" name="starting_image_url" placeholder="https://">

        <button type="submit">Plan clips</button>
    </form>
</div>"#,
        key_hint = key_hint,
        max = workflow.max_clips(),
        default = workflow.default_clips(),
    );

    page("ClipChain", &flash, &body)
}

/// Every prompt in order, with per-step status and the starting image
pub async fn plan_page(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(flash): Query<Flash>,
) -> Response {
    let view = match state.workflow.plan_view(&session_id).await {
        Ok(view) => view,
        Err(e) => return workflow_redirect(&e, &session_id, "/").into_response(),
    };
    let session = &view.session;

    let steps: String = session
        .prompts
        .iter()
        .enumerate()
        .map(|(i, prompt)| {
            let step = i + 1;
            let status = if step <= session.completed_steps() {
                r#"<span class="done">uploaded</span>"#
            } else if step == session.completed_steps() + 1 {
                r#"<span class="pending">next</span>"#
            } else {
                r#"<span class="pending">waiting</span>"#
            };
            format!(
                r#"<li><div class="prompt">{}</div>{} · <a href="{}">open step {}</a></li>"#,
                escape_html(prompt),
                status,
                step_path(&session.session_id, step),
                step
            )
        })
        .collect();

    let image = match &view.starting_image_data_url {
        Some(url) => format!(r#"<img class="preview" src="{}" alt="Starting image">"#, url),
        None => "<p>Starting image not available.</p>".to_string(),
    };

    let next = match session.next_pending_step() {
        Some(step) => format!(
            r#"<a class="button" href="{}">Continue with step {}</a>"#,
            step_path(&session.session_id, step),
            step
        ),
        None => format!(
            r#"<a class="button" href="{}">Combine clips</a>"#,
            combine_path(&session.session_id)
        ),
    };

    let body = format!(
        r#"<div class="card">
    <h2>Scene</h2>
    <p>{description}</p>
    <p>{done} of {total} clips uploaded.</p>
    {image}
</div>
<div class="card">
    <h2>Clip prompts</h2>
    <ol>{steps}</ol>
    {next}
</div>"#,
        description = escape_html(&session.scene_description),
        done = session.completed_steps(),
        total = session.num_clips,
        image = image,
        steps = steps,
        next = next,
    );

    page("Clip plan", &flash, &body).into_response()
}

/// Prompt and source image for one step, with the clip upload form
pub async fn step_page(
    Extension(state): Extension<Arc<AppState>>,
    Path((session_id, step)): Path<(String, usize)>,
    Query(flash): Query<Flash>,
) -> Response {
    let view = match state.workflow.step_view(&session_id, step).await {
        Ok(view) => view,
        Err(e) => return workflow_redirect(&e, &session_id, &plan_path(&session_id)).into_response(),
    };

    let upload = if view.is_uploaded {
        let next = if view.step < view.num_clips {
            format!(
                r#"<a class="button" href="{}">Go to step {}</a>"#,
                step_path(&view.session_id, view.step + 1),
                view.step + 1
            )
        } else {
            format!(
                r#"<a class="button" href="{}">Combine clips</a>"#,
                combine_path(&view.session_id)
            )
        };
        format!(r#"<p class="done">This step's clip has been uploaded.</p>{}"#, next)
    } else {
        format!(
            r#"<form action="/upload/{id}/{step}" method="post" enctype="multipart/form-data">
        <label for="video">Generated clip (MP4, MOV or AVI)</label>
        <input type="file" id="video" name="video" accept=".mp4,.mov,.avi" required>
        <button type="submit">Upload clip</button>
    </form>"#,
            id = escape_html(&view.session_id),
            step = view.step,
        )
    };

    let body = format!(
        r#"<div class="card">
    <h2>Step {step} of {total}</h2>
    <label>Prompt</label>
    <div class="prompt">{prompt}</div>
    <label>Source image</label>
    <img class="preview" src="{image}" alt="Source image for step {step}">
    <p><a href="/image/{id}/{step}" download="step_{step}_source.jpg">Download image</a></p>
</div>
<div class="card">
    {upload}
</div>
<p><a href="{plan}">Back to plan</a></p>"#,
        step = view.step,
        total = view.num_clips,
        prompt = escape_html(&view.prompt),
        image = view.image_data_url,
        id = escape_html(&view.session_id),
        upload = upload,
        plan = plan_path(&view.session_id),
    );

    page(&format!("Step {}", view.step), &flash, &body).into_response()
}

/// Final assembly page; only reachable once every clip is in
pub async fn combine_page(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(flash): Query<Flash>,
) -> Response {
    let view = match state.workflow.combine_view(&session_id).await {
        Ok(view) => view,
        Err(e) => return workflow_redirect(&e, &session_id, &plan_path(&session_id)).into_response(),
    };

    let clips: String = view
        .clips
        .iter()
        .map(|clip| format!("<li>{}</li>", escape_html(clip)))
        .collect();

    let download = if view.is_combined {
        format!(
            r#"<p class="done">The final video is ready.</p>
    <a class="button" href="/download/{}">Download final video</a>"#,
            escape_html(&view.session_id)
        )
    } else {
        String::new()
    };

    let body = format!(
        r#"<div class="card">
    <h2>All {total} clips uploaded</h2>
    <ol>{clips}</ol>
    <form action="/combine/{id}/generate" method="post">
        <button type="submit">{action}</button>
    </form>
    {download}
</div>
<p><a href="{plan}">Back to plan</a></p>"#,
        total = view.num_clips,
        clips = clips,
        id = escape_html(&view.session_id),
        action = if view.is_combined { "Combine again" } else { "Combine clips" },
        download = download,
        plan = plan_path(&view.session_id),
    );

    page("Combine clips", &flash, &body).into_response()
}
