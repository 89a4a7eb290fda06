use image::GenericImageView;
use rfexport::{ExportConfig, HtmlRasterizer, Rasterizer, ReportPage};

const PAGE: &str = r#"<html><body><div id="report">
<h1>Smoke</h1>
<p>Rendered text must leave ink on the page.</p>
<table><tr><td>a</td><td>b</td></tr></table>
</div></body></html>"#;

#[test]
fn smoke_capture_default_region() {
    let config = ExportConfig::default();
    let region = ReportPage::new(PAGE, "#report")
        .unwrap()
        .region(&config, &[])
        .unwrap()
        .expect("region is mounted");

    let shot = HtmlRasterizer::new(&config).capture(&region, 1).unwrap();
    assert_eq!(shot.pixel_width, 794);
    assert_eq!(shot.pixel_height, 1123);

    let img = image::load_from_memory(&shot.data).unwrap();
    assert_eq!(img.dimensions(), (794, 1123));

    let mut dark = 0usize;
    let mut light = 0usize;
    for (_, _, px) in img.pixels() {
        let [r, g, b, _] = px.0;
        let luma = (u32::from(r) + u32::from(g) + u32::from(b)) / 3;
        if luma < 60 {
            dark += 1;
        } else if luma > 200 {
            light += 1;
        }
    }
    assert!(dark > 0, "no ink found");
    assert!(light > dark, "background should dominate");
}
