//! Golden descriptions of assembled PDFs
//!
//! Each golden is a plain-text dump of the parsed document: page boxes, image
//! resources and content-stream operators with operands at two decimals. Run
//! with `UPDATE_GOLDENS=1` to rewrite them after an intended change.

use std::fs;
use std::path::PathBuf;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object};
use revendis_export::exporter::assemble;
use revendis_export::rendering::raster::{encode_rgba_png, RgbaImage};
use revendis_export::{plan_pages, CapturedRaster, PageFormat, PdfAssembler, PlanOptions};

fn golden_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from("tests/goldens/expected");
    p.push(name);
    p
}

/// Deterministic receipt-like raster: horizontal rules every 24 rows
fn fixture_raster() -> CapturedRaster {
    let (width, height) = (160u32, 420u32);
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let v = if y % 24 < 2 || (x / 8 + y / 24) % 5 == 0 { 30 } else { 245 };
        image::Rgba([v, v, v, 255])
    });
    let png = encode_rgba_png(&image).expect("encode fixture");
    CapturedRaster::new(width, height, png)
}

fn operand(object: &Object) -> String {
    match object {
        Object::Name(name) => format!("/{}", String::from_utf8_lossy(name)),
        other => format!("{:.2}", other.as_float().expect("numeric operand")),
    }
}

fn integer(dict: &Dictionary, key: &[u8]) -> i64 {
    dict.get(key).and_then(Object::as_i64).expect("integer entry")
}

fn describe(pdf: &[u8]) -> String {
    let doc = Document::load_mem(pdf).expect("valid PDF");
    let pages = doc.get_pages();
    let mut lines = vec![format!("pages {}", pages.len())];

    for (number, id) in pages {
        lines.push(format!("page {}", number));
        let page = doc.get_object(id).and_then(Object::as_dict).expect("page dictionary");

        let media_box = page.get(b"MediaBox").and_then(Object::as_array).expect("MediaBox");
        let corners: Vec<String> = media_box.iter().map(operand).collect();
        lines.push(format!("  mediabox {}", corners.join(" ")));

        let xobjects = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|r| r.get(b"XObject"))
            .and_then(Object::as_dict)
            .expect("XObject resources");
        for (name, reference) in xobjects.iter() {
            let stream = reference
                .as_reference()
                .and_then(|r| doc.get_object(r))
                .and_then(Object::as_stream)
                .expect("image stream");
            let color_space = stream.dict.get(b"ColorSpace").and_then(Object::as_name).expect("ColorSpace");
            lines.push(format!(
                "  xobject /{} {}x{} {} {}",
                String::from_utf8_lossy(name),
                integer(&stream.dict, b"Width"),
                integer(&stream.dict, b"Height"),
                String::from_utf8_lossy(color_space),
                integer(&stream.dict, b"BitsPerComponent"),
            ));
        }

        let content = doc.get_page_content(id).expect("page content");
        for op in Content::decode(&content).expect("content stream").operations {
            let mut line = format!("  {}", op.operator);
            for o in &op.operands {
                line.push(' ');
                line.push_str(&operand(o));
            }
            lines.push(line);
        }
    }

    lines.join("\n") + "\n"
}

fn check_golden(name: &str, format: PageFormat) {
    let raster = fixture_raster();
    let plan = plan_pages(raster.width, raster.height, format, &PlanOptions::default()).expect("plan");
    let pdf = assemble(&PdfAssembler::new(), &raster, &plan).expect("assemble");
    let actual = describe(&pdf);

    let expected_path = golden_path(name);
    if std::env::var("UPDATE_GOLDENS").is_ok() {
        fs::create_dir_all("tests/goldens/expected").ok();
        fs::write(&expected_path, &actual).expect("write golden");
        println!("Updated golden: {:?}", expected_path);
        return;
    }

    let expected = fs::read_to_string(&expected_path)
        .unwrap_or_else(|e| panic!("unable to read golden {:?} ({}); run with UPDATE_GOLDENS=1", expected_path, e));
    assert_eq!(actual.trim_end(), expected.trim_end(), "PDF output changed for {}", name);
}

#[test]
fn golden_thermal_receipt_pdf() {
    check_golden("receipt-thermal-80.txt", PageFormat::Narrow80);
}

#[test]
fn golden_a4_report_pdf() {
    check_golden("report-a4.txt", PageFormat::FullPage);
}

#[test]
fn pdf_output_is_deterministic() {
    let raster = fixture_raster();
    let plan = plan_pages(raster.width, raster.height, PageFormat::FullPage, &PlanOptions::default()).unwrap();
    let a = assemble(&PdfAssembler::new(), &raster, &plan).unwrap();
    let b = assemble(&PdfAssembler::new(), &raster, &plan).unwrap();
    assert_eq!(a, b);
}
