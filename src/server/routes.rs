use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Result};
use axum::Json;
use serde::Serialize;

use crate::post::DisplayPost;
use crate::server::convert_errors;
use crate::state::State as AppState;
use crate::template::{PageContext, Template};

pub async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    convert_errors(async move {
        let batch = state.batch.state();
        let ctx = PageContext::new(
            &state.cfg.site_name,
            state.cfg.subscribe_url.as_ref().map(|url| url.as_str()),
            &batch,
            state.cfg.skeleton_count,
        );
        let html = state
            .template
            .render(Template::Index.as_str(), &ctx)
            .context("could not render the HTML template")?;

        Ok(Html(html))
    })
    .await
}

#[derive(Serialize, Debug, Clone)]
pub struct PostsResponse {
    state: &'static str,
    posts: Vec<DisplayPost>,
}

pub async fn get_posts(State(state): State<AppState>) -> Json<PostsResponse> {
    let batch = state.batch.state();

    Json(PostsResponse {
        state: batch.as_str(),
        posts: batch.posts().to_vec(),
    })
}

pub async fn refresh_posts(State(state): State<AppState>) -> StatusCode {
    state.batch.refresh();

    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::batch::{BatchHandle, BatchState};
    use crate::config::Config;
    use crate::server::router;

    use super::*;

    fn post() -> DisplayPost {
        DisplayPost {
            id: "blog-0-1705314600000".into(),
            title: "Post".into(),
            description: "Hello & welcome".into(),
            date: "Jan 15, 2024".into(),
            author: "Open Session".into(),
            image: None,
            link: "https://blog.example.com/p/0".into(),
        }
    }

    async fn get(state: BatchState, uri: &str) -> (StatusCode, String) {
        let app = router(AppState::new(Config::default(), BatchHandle::fixed(state)).unwrap());
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn posts_while_loading() {
        let (status, body) = get(BatchState::Loading, "/posts").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({ "state": "loading", "posts": [] })
        );
    }

    #[tokio::test]
    async fn posts_when_ready() {
        let (_, body) = get(BatchState::Ready(vec![post()]), "/posts").await;

        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({
                "state": "ready",
                "posts": [{
                    "id": "blog-0-1705314600000",
                    "title": "Post",
                    "description": "Hello & welcome",
                    "date": "Jan 15, 2024",
                    "author": "Open Session",
                    "image": null,
                    "link": "https://blog.example.com/p/0"
                }]
            })
        );
    }

    #[tokio::test]
    async fn index_hides_failed_section() {
        let (status, body) = get(BatchState::Failed, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<title>Open Session</title>"));
        assert!(!body.contains("recent-posts"));

        let (_, body) = get(BatchState::Idle, "/").await;
        assert_eq!(body.matches("blog-card-skeleton").count(), 3);
    }

    #[tokio::test]
    async fn refresh_is_accepted() {
        let app = router(
            AppState::new(Config::default(), BatchHandle::fixed(BatchState::Failed)).unwrap(),
        );
        let response = app
            .oneshot(
                Request::post("/posts/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
