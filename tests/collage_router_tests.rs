use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use base64::Engine;
use serde_json::{Value, json};
use std::{
    fs,
    io::Cursor,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

use collage_nexus::api::LastfmClient;
use collage_nexus::config::Config;
use collage_nexus::router::{CollageState, collage_router};
use collage_nexus::service::canvas_actor::{self, CanvasActorArgs};
use collage_nexus::service::image_store::PersistentImages;

fn temp_db(tag: &str) -> (String, PathBuf) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "collage-{tag}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    (format!("sqlite:{}", temp_path.display()), temp_path)
}

fn test_config(database_url: &str, key: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        collage_key: key.to_string(),
        // Nothing listens on the discard port: fetches fail fast.
        lastfm_endpoint: "http://127.0.0.1:9/".parse().expect("valid url"),
        ..Config::default()
    }
}

async fn build_app(cfg: &Config) -> Router {
    let store = PersistentImages::open(&cfg.database_url)
        .await
        .expect("open store");
    let handle = canvas_actor::spawn(CanvasActorArgs {
        store,
        size: cfg.canvas_size(),
        album_cooldown: cfg.album_cooldown(),
    })
    .await
    .expect("spawn canvas actor");
    let client = LastfmClient::new(cfg).expect("http client");
    collage_router(CollageState::new(handle, client, cfg))
}

fn png_base64(width: u32, height: u32, rgba: [u8; 4]) -> String {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode png");
    base64::engine::general_purpose::STANDARD.encode(buf)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(builder.body(body).expect("failed to build request"))
        .await
        .expect("request failed");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn upload(app: &Router, names: &[&str]) -> Vec<String> {
    let files: Vec<Value> = names
        .iter()
        .map(|n| json!({"name": n, "data": png_base64(4, 2, [255, 0, 0, 255])}))
        .collect();
    let (status, body) = send(app, "POST", "/images", Some(json!({ "files": files }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["image_ids"]
        .as_array()
        .expect("image ids")
        .iter()
        .map(|v| v.as_str().expect("id").to_string())
        .collect()
}

fn image_names(canvas: &Value) -> Vec<String> {
    canvas["images"]
        .as_array()
        .expect("images")
        .iter()
        .map(|i| i["name"].as_str().expect("name").to_string())
        .collect()
}

#[tokio::test]
async fn upload_reorder_duplicate_and_delete() {
    let (url, path) = temp_db("edit");
    let app = build_app(&test_config(&url, "")).await;

    let ids = upload(&app, &["a.png", "b.png", "c.png"]).await;
    let (_, canvas) = send(&app, "GET", "/canvas", None).await;
    assert_eq!(image_names(&canvas), vec!["a.png", "b.png", "c.png"]);
    assert_eq!(canvas["images"][1]["pos"], json!({"x": 120.0, "y": 120.0}));
    assert_eq!(canvas["images"][0]["width"], 4);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/images/{}/order", ids[1]),
        Some(json!({"order": "up"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");
    let (_, canvas) = send(&app, "GET", "/canvas", None).await;
    assert_eq!(image_names(&canvas), vec!["a.png", "c.png", "b.png"]);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/images/{}/order", ids[0]),
        Some(json!({"order": "down"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "unchanged");

    let (status, body) = send(&app, "POST", &format!("/images/{}/duplicate", ids[0]), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let copy_id = body["image_id"].as_str().expect("copy id").to_string();
    let (_, canvas) = send(&app, "GET", "/canvas", None).await;
    let copy = canvas["images"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["id"] == copy_id.as_str())
        .expect("copy present")
        .clone();
    assert_eq!(copy["name"], "a.png (copy)");
    assert_eq!(copy["pos"], json!({"x": 120.0, "y": 120.0}));

    let (status, _) = send(&app, "DELETE", &format!("/images/{}", ids[2]), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &format!("/images/{}", ids[2]), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, canvas) = send(&app, "GET", "/canvas", None).await;
    let layer_ids = canvas["layers"][0]["image_ids"].as_array().unwrap();
    assert!(!layer_ids.iter().any(|v| v == ids[2].as_str()));

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn layers_cannot_drop_to_zero() {
    let (url, path) = temp_db("layers");
    let app = build_app(&test_config(&url, "")).await;

    let (status, body) = send(&app, "DELETE", "/layers/layer_1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "LAST_LAYER");

    let (status, body) = send(&app, "POST", "/layers", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let second = body["layer_id"].as_str().unwrap().to_string();
    let (_, body) = send(&app, "POST", "/layers", None).await;
    let third = body["layer_id"].as_str().unwrap().to_string();

    let (_, canvas) = send(&app, "GET", "/canvas", None).await;
    let names: Vec<_> = canvas["layers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Main", "Layer 2", "Layer 3"]);
    assert_eq!(canvas["selected_layer_id"], third.as_str());

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/layers/{second}"),
        Some(json!({"opacity": 4.0, "locked": true, "name": "Top"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, canvas) = send(&app, "GET", "/canvas", None).await;
    assert_eq!(canvas["layers"][1]["opacity"], 1.0);
    assert_eq!(canvas["layers"][1]["locked"], true);
    assert_eq!(canvas["layers"][1]["name"], "Top");

    let (status, _) = send(&app, "DELETE", "/layers/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn concurrent_layer_patches_agree_on_state() {
    let (url, path) = temp_db("layer-patch");
    let app = build_app(&test_config(&url, "")).await;

    let hide = json!({"visible": false});
    let (first, second) = tokio::join!(
        send(&app, "PATCH", "/layers/layer_1", Some(hide.clone())),
        send(&app, "PATCH", "/layers/layer_1", Some(hide)),
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    let mut outcomes = vec![first.1["outcome"].clone(), second.1["outcome"].clone()];
    outcomes.sort_by_key(|v| v.to_string());
    assert_eq!(outcomes, vec![json!("applied"), json!("unchanged")]);

    let (_, canvas) = send(&app, "GET", "/canvas", None).await;
    assert_eq!(canvas["layers"][0]["visible"], false);

    let (status, _) = send(
        &app,
        "PATCH",
        "/layers/nope",
        Some(json!({"visible": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn export_is_png_at_pixel_ratio() {
    let (url, path) = temp_db("export");
    let app = build_app(&test_config(&url, "")).await;

    let (status, _) = send(
        &app,
        "PUT",
        "/canvas/size",
        Some(json!({"width": 10, "height": 6})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/export")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"collage.png\""
    );
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let img = image::load_from_memory(&bytes).expect("valid png");
    assert_eq!((img.width(), img.height()), (20, 12));

    let (status, body) = send(&app, "GET", "/export/data-uri?pixel_ratio=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["data_uri"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn images_survive_restart() {
    let (url, path) = temp_db("restore");
    let cfg = test_config(&url, "");
    let app = build_app(&cfg).await;

    let (_, session) = send(&app, "GET", "/session", None).await;
    assert_eq!(session["is_new"], true);

    let ids = upload(&app, &["keep.png"]).await;
    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/images/{}", ids[0]),
        Some(json!({"pos": {"x": 7.0, "y": 9.0}, "style": {"rotation": 30.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let restarted = build_app(&cfg).await;
    let (_, session) = send(&restarted, "GET", "/session", None).await;
    assert_eq!(session["is_new"], false);
    let (_, canvas) = send(&restarted, "GET", "/canvas", None).await;
    let img = &canvas["images"][0];
    assert_eq!(img["id"], ids[0].as_str());
    assert_eq!(img["pos"], json!({"x": 7.0, "y": 9.0}));
    assert_eq!(img["style"]["rotation"], 30.0);
    assert_eq!(img["style"]["scale"], 1.0);

    let resp = restarted
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/images/{}/blob", ids[0]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");

    let (status, _) = send(&restarted, "DELETE", "/images", None).await;
    assert_eq!(status, StatusCode::OK);
    let again = build_app(&cfg).await;
    let (_, canvas) = send(&again, "GET", "/canvas", None).await;
    assert!(canvas["images"].as_array().unwrap().is_empty());

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn stacking_order_survives_restart() {
    let (url, path) = temp_db("zorder");
    let cfg = test_config(&url, "");
    let app = build_app(&cfg).await;

    let ids = upload(&app, &["a.png", "b.png", "c.png"]).await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/images/{}/order", ids[0]),
        Some(json!({"order": "front"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // A later edit of another image must not change the stacking.
    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/images/{}", ids[1]),
        Some(json!({"pos": {"x": 1.0, "y": 1.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, canvas) = send(&app, "GET", "/canvas", None).await;
    assert_eq!(image_names(&canvas), vec!["b.png", "c.png", "a.png"]);

    let restarted = build_app(&cfg).await;
    let (_, canvas) = send(&restarted, "GET", "/canvas", None).await;
    assert_eq!(image_names(&canvas), vec!["b.png", "c.png", "a.png"]);

    let (status, _) = send(&restarted, "DELETE", &format!("/images/{}", ids[2]), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &restarted,
        "POST",
        &format!("/images/{}/order", ids[0]),
        Some(json!({"order": "back"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let again = build_app(&cfg).await;
    let (_, canvas) = send(&again, "GET", "/canvas", None).await;
    assert_eq!(image_names(&canvas), vec!["a.png", "b.png"]);

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn album_fetch_is_rate_limited() {
    let (url, path) = temp_db("albums");
    let app = build_app(&test_config(&url, "")).await;

    let (status, body) = send(&app, "POST", "/albums/fetch", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_USERNAME");

    let (status, body) = send(
        &app,
        "PUT",
        "/albums/query",
        Some(json!({"username": "rj", "period": "7day"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"], "7day");

    // Upstream unreachable: logged, no albums, still counts as a request.
    let (status, body) = send(&app, "POST", "/albums/fetch", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["albums"].as_array().unwrap().is_empty());

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/albums/fetch")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));

    let (status, _) = send(&app, "POST", "/albums/1/place", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let _ = fs::remove_file(&path);
}

#[tokio::test]
async fn key_is_required_when_configured() {
    let (url, path) = temp_db("auth");
    let app = build_app(&test_config(&url, "pwd")).await;

    let (status, _) = send(&app, "GET", "/canvas", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/canvas")
                .header("x-collage-key", "pwd")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, _) = send(&app, "GET", "/canvas?key=pwd", None).await;
    assert_eq!(status, StatusCode::OK);

    let _ = fs::remove_file(&path);
}
