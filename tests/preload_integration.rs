//! Image preloading against a local HTTP server

#![cfg(feature = "fetch")]

use image::{DynamicImage, GenericImageView, ImageOutputFormat, Rgba, RgbaImage};
use rfexport::preload::ImagePreloader;
use rfexport::rendering::images::decode_data_url;
use rfexport::{Error, ExportConfig, ExportOutcome, MemorySink, Preview, ReportPage};
use std::io::Cursor;
use std::sync::{Arc, Once};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

static INIT: Once = Once::new();
const ADDR: &str = "127.0.0.1:18091";

fn png(color: [u8; 4]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba(color)))
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

fn color_for(path: &str) -> Option<[u8; 4]> {
    match path {
        "/img/red.png" => Some([255, 0, 0, 255]),
        "/img/green.png" => Some([0, 255, 0, 255]),
        "/img/slow.png" => Some([0, 0, 255, 255]),
        _ => None,
    }
}

fn start_test_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http(ADDR).unwrap();
            for request in server.incoming_requests() {
                std::thread::spawn(move || {
                    let path = request.url().to_string();
                    if path == "/img/slow.png" {
                        std::thread::sleep(Duration::from_millis(200));
                    }
                    let _ = match color_for(&path) {
                        Some(color) => request.respond(
                            Response::from_data(png(color))
                                .with_header("Content-Type: image/png".parse::<Header>().unwrap()),
                        ),
                        None => request.respond(Response::from_string("not found").with_status_code(404)),
                    };
                });
            }
        });
        std::thread::sleep(Duration::from_millis(100));
    });

    format!("http://{}", ADDR)
}

fn pixel_of(data_url: &str) -> [u8; 4] {
    let (mime, bytes) = decode_data_url(data_url).unwrap();
    assert_eq!(mime, "image/png");
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!(img.dimensions(), (4, 2));
    img.get_pixel(0, 0).0
}

#[tokio::test]
async fn results_keep_request_order() {
    let base = start_test_server();
    let preloader = ImagePreloader::new(&ExportConfig::default()).unwrap();
    let sources = vec![
        format!("{}/img/slow.png", base),
        format!("{}/img/red.png", base),
        format!("{}/img/green.png", base),
    ];

    let images = preloader.preload(&sources).await.unwrap();
    let returned: Vec<&str> = images.iter().map(|i| i.source.as_str()).collect();
    assert_eq!(returned, sources.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(pixel_of(&images[0].data_url), [0, 0, 255, 255]);
    assert_eq!(pixel_of(&images[1].data_url), [255, 0, 0, 255]);
    assert_eq!(pixel_of(&images[2].data_url), [0, 255, 0, 255]);
}

#[tokio::test]
async fn one_failed_fetch_fails_the_batch() {
    let base = start_test_server();
    let preloader = ImagePreloader::new(&ExportConfig::default()).unwrap();
    let sources = vec![format!("{}/img/red.png", base), format!("{}/img/gone.png", base)];

    let err = preloader.preload(&sources).await.unwrap_err();
    assert!(matches!(err, Error::NetworkError(ref msg) if msg.contains("gone.png")));
}

#[tokio::test]
async fn preloaded_report_exports() {
    let base = start_test_server();
    let html = r#"<html><body><div id="report">
        <h2>Photos</h2>
        <img src="img/red.png">
        <img src="img/green.png">
        <img src="img/red.png">
    </div></body></html>"#;
    let sink = Arc::new(MemorySink::new());
    let page = ReportPage::new(html, "#report").unwrap();
    let preview = Preview::new(page, ExportConfig::default(), sink.clone()).unwrap();
    let preloader = ImagePreloader::new(preview.config())
        .unwrap()
        .with_base_url(&format!("{}/", base))
        .unwrap();

    let count = preview.open_and_preload(&preloader).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(preview.state().images.len(), 2);

    let outcome = preview.export().await;
    assert!(matches!(outcome, ExportOutcome::Saved { .. }), "{:?}", outcome);
    assert_eq!(sink.save_count(), 1);
}

#[tokio::test]
async fn failed_preload_leaves_no_images() {
    let base = start_test_server();
    let html = r#"<div id="report"><img src="img/red.png"><img src="img/gone.png"></div>"#;
    let page = ReportPage::new(html, "#report").unwrap();
    let preview = Preview::new(page, ExportConfig::default(), Arc::new(MemorySink::new())).unwrap();
    let preloader = ImagePreloader::new(preview.config())
        .unwrap()
        .with_base_url(&format!("{}/", base))
        .unwrap();

    assert!(preview.open_and_preload(&preloader).await.is_err());
    let state = preview.state();
    assert!(state.open);
    assert!(state.images.is_empty());
    // the export still runs and reports the missing image instead of hanging
    assert!(matches!(preview.export().await, ExportOutcome::Failed(_)));
}
