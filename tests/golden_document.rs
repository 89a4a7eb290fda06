use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rfexport::rendering::layout::{layout_region, text_width, LayoutKind};
use rfexport::{ExportConfig, ExportOutcome, MemorySink, PagePlacement, Preview, ReportPage};
use sha2::{Digest, Sha256};

fn golden_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from("tests/goldens/expected");
    p.push(name);
    p
}

fn fixture_page() -> ReportPage {
    let html = fs::read_to_string("tests/goldens/pages/report1.html").expect("read fixture");
    ReportPage::new(html, "#report").expect("valid selector")
}

#[test]
fn golden_layout_advances_wide_glyphs() {
    let region = fixture_page()
        .region(&ExportConfig::default(), &[])
        .expect("region")
        .expect("region is mounted");
    let tree = layout_region(&region).expect("layout");
    assert_eq!((tree.width, tree.height), (794, 1123));

    let cjk = tree
        .nodes
        .iter()
        .find_map(|n| match &n.kind {
            LayoutKind::Text { lines, .. } if lines.iter().any(|l| l.contains('月')) => Some(lines.clone()),
            _ => None,
        })
        .expect("CJK line laid out");
    assert_eq!(cjk, vec!["月次点検 完了".to_string()]);
    // six wide glyphs at 16px plus one space at 8px
    assert_eq!(text_width(&cjk[0], 1), 104);
}

#[tokio::test]
async fn golden_document_matches_fixture() {
    let sink = Arc::new(MemorySink::new());
    let preview = Preview::new(fixture_page(), ExportConfig::default(), sink.clone()).expect("preview");
    preview.open();

    let outcome = preview.export().await;
    let ExportOutcome::Saved { placements, .. } = outcome else {
        panic!("unexpected outcome {:?}", outcome);
    };
    let (_, bytes) = sink.saved().pop().expect("saved document");
    let digest = hex::encode(Sha256::digest(&bytes));

    let placements_path = golden_path("report1.placements.json");
    let expected_path = golden_path("report1.sha256");
    if std::env::var("UPDATE_GOLDENS").is_ok() {
        fs::create_dir_all("tests/goldens/expected").ok();
        let json = serde_json::to_string_pretty(&placements).expect("serialize placements");
        fs::write(&placements_path, json + "\n").expect("write golden");
        fs::write(&expected_path, &digest).expect("write golden");
        println!("Updated goldens: {:?}, {:?}", placements_path, expected_path);
        return;
    }

    let expected: Vec<PagePlacement> =
        serde_json::from_str(&fs::read_to_string(&placements_path).expect("unable to read golden"))
            .expect("invalid placements golden");
    assert_eq!(placements, expected);

    // the byte digest depends on the JPEG encoder build, so it is recorded per checkout
    if !expected_path.exists() {
        println!(
            "No golden at {:?}; run with UPDATE_GOLDENS=1 to create it. Skipping digest check.",
            expected_path
        );
        return;
    }

    let expected = fs::read_to_string(&expected_path).expect("unable to read golden");
    assert_eq!(digest, expected.trim());
}
