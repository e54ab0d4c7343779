use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use memories_core::{
    store::guess_content_type, FileBlob, GalleryStatus, GalleryView, StoredImage, UploadError,
    UploadState,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    #[serde(flatten)]
    pub status: GalleryStatus,
    pub images: Vec<StoredImage>,
}

impl GalleryResponse {
    fn new(status: GalleryStatus, view: &GalleryView) -> Self {
        Self {
            status,
            images: view.images().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub state: UploadState,
    pub percentage: u8,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
    /// `null` when the object was stored but no URL could be resolved.
    pub url: Option<String>,
}

/// Index page: upload form plus the latest photos
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let loader = state.memories.loader();
    Html(generate_index_html(&loader.status(), &loader.view(), loader.capacity()))
}

/// Current gallery view
pub async fn get_gallery(State(state): State<AppState>) -> Json<GalleryResponse> {
    let loader = state.memories.loader();
    Json(GalleryResponse::new(loader.status(), &loader.view()))
}

/// Force a refresh from storage
pub async fn refresh_gallery(State(state): State<AppState>) -> Json<GalleryResponse> {
    tracing::info!("Gallery refresh requested");
    let loader = state.memories.loader();

    // A failed refresh still answers with the retained view and a failed status.
    let _ = loader.refresh().await;
    Json(GalleryResponse::new(loader.status(), &loader.view()))
}

/// Upload state and percentage of the running upload
pub async fn get_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    let uploads = state.memories.uploads();
    Json(ProgressResponse {
        state: uploads.state(),
        percentage: uploads.progress().percentage(),
    })
}

/// Upload the first file field of a multipart form
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), StatusCode> {
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {:?}", e);
        StatusCode::BAD_REQUEST
    })? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let bytes = field.bytes().await.map_err(|e| {
            tracing::error!("Failed to read upload body for {}: {:?}", name, e);
            StatusCode::BAD_REQUEST
        })?;
        file = Some(FileBlob::new(name, bytes));
        break;
    }

    tracing::info!(
        "Upload request: file={:?}",
        file.as_ref().map(|f| (&f.name, f.size()))
    );

    match state.memories.submit(file).await {
        Ok(Some(image)) => Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                key: image.key.to_string(),
                url: image.download_url,
            }),
        )),
        Ok(None) => Err(StatusCode::BAD_REQUEST),
        Err(UploadError::Busy) => Err(StatusCode::CONFLICT),
        Err(UploadError::Store(_)) => Err(StatusCode::BAD_GATEWAY),
    }
}

/// Serve an uploaded object's bytes
pub async fn get_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, StatusCode> {
    tracing::debug!("Media request: key={}", key);

    let data = state
        .memories
        .store()
        .get_object(&key.clone().into())
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch media {}: {:?}", key, e);
            StatusCode::NOT_FOUND
        })?;

    let content_type = guess_content_type(&key);
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}

fn generate_index_html(status: &GalleryStatus, view: &GalleryView, capacity: usize) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="hr">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Uspomene</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            margin: 0;
            text-align: center;
            color: #333;
        }}

        .banner {{
            background: rgba(201, 169, 110, 0.3);
            font-weight: bold;
            padding: 8px 16px;
        }}

        .actions {{
            display: flex;
            gap: 16px;
            margin-top: 20px;
            align-items: center;
            justify-content: center;
        }}

        .btn {{
            font-weight: bold;
            border: 1px solid #c9a96e;
            border-radius: 4px;
            background: #fff;
            padding: 8px 16px;
            cursor: pointer;
        }}

        .heading {{
            margin: 48px auto 16px;
            width: 50%;
            font-weight: bold;
            background: rgba(201, 169, 110, 0.3);
            border-radius: 9999px;
            padding: 8px 16px;
        }}

        .notice {{
            color: #999;
        }}

        .gallery img {{
            display: block;
            max-width: 100%;
            margin: 0 auto 4px;
        }}
    </style>
</head>
<body>
    <p class="banner">Neka i tvoja slika bude dio uspomena</p>

    <form class="actions" id="upload-form">
        <label class="btn" for="file">Izaberi sliku</label>
        <input hidden type="file" id="file" name="file" accept="image/*">
        <span>&rarr;</span>
        <button class="btn" type="submit">Podijeli sliku</button>
    </form>
    <p class="notice" id="progress"></p>

    <div class="heading">Zadnjih {capacity} slika</div>
    {notice}
    <div class="gallery">
        {images}
    </div>

    <script>
        const form = document.getElementById('upload-form');
        const input = document.getElementById('file');
        const progress = document.getElementById('progress');

        input.addEventListener('change', () => {{
            progress.textContent = input.files.length ? input.files[0].name : '';
        }});

        async function pollProgress() {{
            const response = await fetch('/api/progress');
            const body = await response.json();
            if (body.state === 'uploading') {{
                progress.textContent = `${{body.percentage}}%`;
                setTimeout(pollProgress, 500);
            }}
        }}

        form.addEventListener('submit', async (e) => {{
            e.preventDefault();
            if (!input.files.length) return;

            const data = new FormData();
            data.append('file', input.files[0]);
            setTimeout(pollProgress, 200);

            const response = await fetch('/api/upload', {{ method: 'POST', body: data }});
            if (response.ok) {{
                window.location.reload();
            }} else {{
                progress.textContent = '';
                input.value = '';
            }}
        }});
    </script>
</body>
</html>"#,
        capacity = capacity,
        notice = generate_notice_html(status),
        images = generate_images_html(view),
    )
}

fn generate_notice_html(status: &GalleryStatus) -> String {
    match status {
        GalleryStatus::Loading => r#"<p class="notice">Učitavanje...</p>"#.to_string(),
        GalleryStatus::Ready => String::new(),
        GalleryStatus::Failed { .. } => {
            r#"<p class="notice">Slike trenutno nije moguće osvježiti.</p>"#.to_string()
        }
    }
}

fn generate_images_html(view: &GalleryView) -> String {
    view.images()
        .iter()
        .map(|image| {
            format!(
                r#"<img src="{url}" alt="{key}" loading="lazy">"#,
                url = html_escape(&image.download_url),
                key = html_escape(image.key.as_str()),
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
