//! Headless Chrome integration (requires Chrome; run with `--features cdp -- --ignored`)
#![cfg(feature = "cdp")]

use std::sync::{Arc, Once};

use revendis_export::cdp::{CdpCapture, CdpPrintHost, CdpSession};
use revendis_export::{
    Capture, CaptureOptions, Exporter, ExportRequest, MemorySink, PageFormat, PdfAssembler, PrintHost, PrintOutcome, PrintPipeline,
    PrintRequest,
};
use tiny_http::{Response, Server};

static INIT: Once = Once::new();

fn start_test_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http("127.0.0.1:18090").unwrap();
            for request in server.incoming_requests() {
                let response = match request.url() {
                    "/" => Response::from_string(
                        r#"<!DOCTYPE html>
<html>
<head><title>Venda</title></head>
<body style="margin:0">
<div id="receipt" style="width:300px;height:600px;background:#fafafa">
  <h1>Venda #42</h1>
  <img src="http://127.0.0.1:1/missing.png" width="10" height="10">
</div>
</body>
</html>"#,
                    )
                    .with_header(
                        "Content-Type: text/html; charset=utf-8"
                            .parse::<tiny_http::Header>()
                            .unwrap(),
                    ),
                    _ => Response::from_string("Not Found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    "http://127.0.0.1:18090".to_string()
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_capture_element_to_thermal_pdf() {
    let base = start_test_server();
    let session = Arc::new(CdpSession::launch(1024, 768).expect("Failed to launch Chrome"));
    session.load_url(&base).expect("load");

    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(CdpCapture::new(session), PdfAssembler::new(), sink.clone());
    let receipt = exporter
        .export(&ExportRequest::new("#receipt".to_string(), "venda-42-thermal.pdf", PageFormat::Narrow58))
        .await
        .expect("export");

    assert_eq!(receipt.pages, 1);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_missing_element_is_detached() {
    let base = start_test_server();
    let session = Arc::new(CdpSession::launch(1024, 768).expect("Failed to launch Chrome"));
    session.load_url(&base).expect("load");

    let exporter = Exporter::new(CdpCapture::new(session), PdfAssembler::new(), MemorySink::new());
    let result = exporter
        .export(&ExportRequest::new("#nope".to_string(), "x.pdf", PageFormat::FullPage))
        .await;
    assert!(result.is_err());
    assert!(exporter.sink().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_print_frame_is_removed() {
    let base = start_test_server();
    let session = Arc::new(CdpSession::launch(1024, 768).expect("Failed to launch Chrome"));
    session.load_url(&base).expect("load");

    let host = Arc::new(CdpPrintHost::new(session));
    let pipeline = PrintPipeline::new(host.clone());
    let outcome = pipeline
        .print(&PrintRequest::new("<p>Venda #42</p>"))
        .await
        .expect("print");
    let PrintOutcome::Dispatched(pending) = outcome else {
        panic!("expected a writable frame");
    };
    let id = pending.surface();
    assert!(host.has_document(id).await);

    pending.removed().await;
    assert!(!host.has_document(id).await);
}

#[tokio::test]
#[ignore]
async fn test_widened_capture_restores_the_element_style() {
    let base = start_test_server();
    let session = Arc::new(CdpSession::launch(1024, 768).expect("Failed to launch Chrome"));
    session.load_url(&base).expect("load");

    let capture = CdpCapture::new(session.clone());
    let options = CaptureOptions {
        scale: 1.0,
        min_width_px: 500,
        ..CaptureOptions::default()
    };
    let raster = capture.capture(&"#receipt".to_string(), &options).await.expect("capture");
    assert_eq!(raster.width, 500);

    let min_width = session
        .tab()
        .evaluate("document.getElementById('receipt').style.minWidth", false)
        .expect("evaluate")
        .value;
    assert_eq!(min_width, Some(serde_json::Value::String(String::new())));
}
