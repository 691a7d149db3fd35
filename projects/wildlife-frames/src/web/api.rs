use crate::relabel::{apply_event, FrameView, RelabelEvent, RelabelSession};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct RelabelState {
    pub session: Mutex<RelabelSession>,
    pub dataset_dir: PathBuf,
    pub ledger_path: PathBuf,
}

impl RelabelState {
    fn session(&self) -> Result<MutexGuard<'_, RelabelSession>, StatusCode> {
        self.session
            .lock()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[derive(Serialize)]
pub struct EventResponse {
    #[serde(flatten)]
    pub frame: FrameView,
    /// Rows changed by a `save` event.
    pub saved: Option<usize>,
}

pub async fn get_frame(
    State(state): State<Arc<RelabelState>>,
) -> Result<Json<FrameView>, StatusCode> {
    Ok(Json(state.session()?.view()))
}

pub async fn get_frame_image(
    State(state): State<Arc<RelabelState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let view = state.session()?.view();
    let image_path = state
        .dataset_dir
        .join(&view.video_name)
        .join(&view.file_name);

    let bytes = fs::read(&image_path).map_err(|e| {
        tracing::warn!("Failed to read {:?}: {}", image_path, e);
        StatusCode::NOT_FOUND
    })?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

pub async fn post_event(
    State(state): State<Arc<RelabelState>>,
    Path(event): Path<String>,
) -> Result<Json<EventResponse>, StatusCode> {
    let event: RelabelEvent = event.parse().map_err(|e: String| {
        tracing::warn!("{}", e);
        StatusCode::BAD_REQUEST
    })?;

    let mut session = state.session()?;
    let saved = if apply_event(&mut session, event) {
        let changed = session.commit(&state.ledger_path).map_err(|e| {
            tracing::warn!("Failed to save ledger {:?}: {:#}", state.ledger_path, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        Some(changed)
    } else {
        None
    };

    Ok(Json(EventResponse {
        frame: session.view(),
        saved,
    }))
}

pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Relabel frames</title>
<style>
  body { font-family: sans-serif; margin: 2em; }
  img { image-rendering: pixelated; width: 480px; border: 1px solid #888; }
  button { margin-right: 0.5em; }
</style>
</head>
<body>
<h2 id="title"></h2>
<img id="frame" alt="frame">
<p>Class: <strong id="target"></strong> <span id="status"></span></p>
<button data-event="prev">Previous</button>
<button data-event="next">Next</button>
<button data-event="toggle">Toggle class (t)</button>
<button data-event="save">Save (s)</button>
<script>
function render(view) {
  document.getElementById("title").textContent =
    view.video_name + " frame " + view.frame_ind + " (" + (view.position + 1) + "/" + view.frame_count + ")";
  document.getElementById("target").textContent = view.target;
  document.getElementById("frame").src = "/api/frame/image?ind=" + view.frame_ind;
  document.getElementById("status").textContent =
    view.saved === undefined || view.saved === null ? "" : "saved " + view.saved + " changes";
}
function send(event) {
  fetch("/api/event/" + event, { method: "POST" }).then(r => r.json()).then(render);
}
document.querySelectorAll("button").forEach(b => b.onclick = () => send(b.dataset.event));
document.addEventListener("keydown", e => {
  const keys = { ArrowLeft: "left", ArrowRight: "right", t: "t", s: "s" };
  if (keys[e.key]) send(keys[e.key]);
});
fetch("/api/frame").then(r => r.json()).then(render);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{dataset_dir, ledger_path, FrameLedger, FrameRecord};

    fn state(root: &std::path::Path) -> Arc<RelabelState> {
        let ledger = FrameLedger::from_records(vec![
            FrameRecord::new("v", 0, "background", "rat").unwrap(),
            FrameRecord::new("v", 1, "background", "rat").unwrap(),
        ])
        .unwrap();
        ledger.write(&ledger_path(root)).unwrap();

        let classes = vec!["rat".to_string(), "background".to_string()];
        let session = RelabelSession::from_ledger(&ledger, "v", classes).unwrap();
        Arc::new(RelabelState {
            session: Mutex::new(session),
            dataset_dir: dataset_dir(root),
            ledger_path: ledger_path(root),
        })
    }

    #[tokio::test]
    async fn test_events_update_view_and_save_commits() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let Json(view) = get_frame(State(state.clone())).await.unwrap();
        assert_eq!(view.frame_ind, 0);

        let Json(resp) = post_event(State(state.clone()), Path("right".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.frame.frame_ind, 1);
        assert_eq!(resp.saved, None);

        let Json(resp) = post_event(State(state.clone()), Path("t".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.frame.target, "background");

        let Json(resp) = post_event(State(state.clone()), Path("t".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.frame.target, "rat");

        let Json(resp) = post_event(State(state.clone()), Path("save".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.saved, Some(1));
        let ledger = FrameLedger::read(&ledger_path(dir.path())).unwrap();
        assert_eq!(ledger.get("v", 1).unwrap().target(), "rat");
    }

    #[tokio::test]
    async fn test_unknown_event_and_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let err = post_event(State(state.clone()), Path("jump".to_string()))
            .await
            .err();
        assert_eq!(err, Some(StatusCode::BAD_REQUEST));

        let response = get_frame_image(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
