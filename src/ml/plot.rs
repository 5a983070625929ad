// src/ml/plot.rs
//! Line plots of metric curves, rendered as SVG and embedded in markdown as a
//! base64 data URI so any metadata sink can carry them as plain text.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use std::fmt::Write;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 360.0;
const MARGIN: f64 = 40.0;

/// Renders `values` (one point per boosting round) as a standalone SVG.
/// Non-finite values are skipped.
pub fn render_line_plot_svg(title: &str, values: &[f64]) -> String {
    let points: Vec<(usize, f64)> = values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .collect();

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = WIDTH,
        h = HEIGHT
    );
    let _ = write!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = write!(
        svg,
        r#"<text x="{}" y="20" font-family="sans-serif" font-size="14" text-anchor="middle">{}</text>"#,
        WIDTH / 2.0,
        escape(title)
    );
    let _ = write!(
        svg,
        r#"<line x1="{m}" y1="{b}" x2="{r}" y2="{b}" stroke="black"/><line x1="{m}" y1="{t}" x2="{m}" y2="{b}" stroke="black"/>"#,
        m = MARGIN,
        t = MARGIN,
        b = HEIGHT - MARGIN,
        r = WIDTH - MARGIN
    );

    if !points.is_empty() {
        let min = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        let span = if max > min { max - min } else { 1.0 };
        let last_index = values.len().saturating_sub(1).max(1) as f64;

        let coords: Vec<String> = points
            .iter()
            .map(|&(i, v)| {
                let x = MARGIN + (i as f64 / last_index) * (WIDTH - 2.0 * MARGIN);
                let y = HEIGHT - MARGIN - ((v - min) / span) * (HEIGHT - 2.0 * MARGIN);
                format!("{:.1},{:.1}", x, y)
            })
            .collect();

        let _ = write!(
            svg,
            r#"<polyline fill="none" stroke="steelblue" stroke-width="2" points="{}"/>"#,
            coords.join(" ")
        );
        let _ = write!(
            svg,
            r#"<text x="4" y="{}" font-family="sans-serif" font-size="10">{:.3}</text><text x="4" y="{}" font-family="sans-serif" font-size="10">{:.3}</text>"#,
            MARGIN,
            max,
            HEIGHT - MARGIN,
            min
        );
    }

    svg.push_str("</svg>");
    svg
}

/// Markdown image whose source is the SVG inlined as a data URI.
pub fn markdown_image(svg: &str) -> String {
    format!(
        "![img](data:image/svg+xml;base64,{})",
        BASE64_STANDARD.encode(svg.as_bytes())
    )
}

/// Convenience for metric curves: plot and embed in one step.
pub fn metric_plot_markdown(metric: &str, values: &[f64]) -> String {
    markdown_image(&render_line_plot_svg(metric, values))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plot_contains_one_vertex_per_finite_value() {
        let svg = render_line_plot_svg("mean_absolute_error", &[5.0, 4.0, f64::NAN, 3.5]);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        let points = svg.split("points=\"").nth(1).unwrap().split('"').next().unwrap();
        assert_eq!(points.split(' ').count(), 3);
    }

    #[test]
    fn test_empty_curve_still_renders() {
        let svg = render_line_plot_svg("empty", &[]);
        assert!(!svg.contains("polyline"));
    }

    #[test]
    fn test_markdown_embeds_base64_svg() {
        let md = metric_plot_markdown("a < b", &[1.0, 2.0]);
        let encoded = md
            .strip_prefix("![img](data:image/svg+xml;base64,")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap();
        let decoded = String::from_utf8(BASE64_STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(decoded.contains("a &lt; b"));
    }
}
