use crate::autocorrelation::{LocalMoran, Quadrant};
use crate::types::{AggregateRecord, TractValue};
use anyhow::{anyhow, Context, Result};
use geo::bounding_rect::BoundingRect;
use geo::{Coord, LineString, MultiPolygon, Point, Rect};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_polygon_mut, draw_text_mut, text_size,
};
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect as PixelRect;
use rusttype::{Font, Scale};
use std::fs;
use std::path::Path;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const AXIS: Rgba<u8> = Rgba([90, 90, 90, 255]);
const TEXT: Rgba<u8> = Rgba([30, 30, 30, 255]);
const EDGE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRACT_FILL: Rgba<u8> = Rgba([255, 200, 128, 255]);
const POINT: Rgba<u8> = Rgba([220, 20, 20, 255]);
const NON_CHAIN_BAR: Rgba<u8> = Rgba([31, 119, 180, 255]);
const CHAIN_BAR: Rgba<u8> = Rgba([255, 127, 14, 255]);
const NOT_SIGNIFICANT: Rgba<u8> = Rgba([211, 211, 211, 255]);
const PAD: f64 = 40.0;

static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// RdYlGn reversed, 5 classes: low densities green, high red.
pub const QUANTILE_PALETTE: [Rgba<u8>; 5] = [
    Rgba([26, 150, 65, 255]),
    Rgba([166, 217, 106, 255]),
    Rgba([255, 255, 191, 255]),
    Rgba([253, 174, 97, 255]),
    Rgba([215, 25, 28, 255]),
];

pub fn quadrant_color(quadrant: Quadrant) -> Rgba<u8> {
    match quadrant {
        Quadrant::HighHigh => Rgba([215, 25, 28, 255]),
        Quadrant::LowHigh => Rgba([171, 217, 233, 255]),
        Quadrant::LowLow => Rgba([44, 123, 182, 255]),
        Quadrant::HighLow => Rgba([253, 174, 97, 255]),
    }
}

fn lisa_color(local: &LocalMoran) -> Rgba<u8> {
    if local.significant {
        quadrant_color(local.quadrant)
    } else {
        NOT_SIGNIFICANT
    }
}

/// Linear map from data coordinates to pixels (y up in data, down in pixels).
#[derive(Debug, Clone, Copy)]
struct Frame {
    min: Coord<f64>,
    scale_x: f64,
    scale_y: f64,
    offset_x: f64,
    offset_y: f64,
    height: f64,
}

impl Frame {
    fn fit(bounds: Rect<f64>, width: u32, height: u32, equal_aspect: bool) -> Frame {
        let (w, h) = (width as f64, height as f64);
        let span_x = bounds.width().max(1e-9);
        let span_y = bounds.height().max(1e-9);
        let inner_w = (w - 2.0 * PAD).max(1.0);
        let inner_h = (h - 2.0 * PAD).max(1.0);
        let (mut sx, mut sy) = (inner_w / span_x, inner_h / span_y);
        if equal_aspect {
            let s = sx.min(sy);
            sx = s;
            sy = s;
        }
        Frame {
            min: bounds.min(),
            scale_x: sx,
            scale_y: sy,
            offset_x: PAD + (inner_w - span_x * sx) / 2.0,
            offset_y: PAD + (inner_h - span_y * sy) / 2.0,
            height: h,
        }
    }

    fn to_pixel(&self, c: Coord<f64>) -> (f32, f32) {
        let x = self.offset_x + (c.x - self.min.x) * self.scale_x;
        let y = self.height - (self.offset_y + (c.y - self.min.y) * self.scale_y);
        (x as f32, y as f32)
    }
}

fn union_bounds(rects: impl IntoIterator<Item = Rect<f64>>) -> Option<Rect<f64>> {
    rects.into_iter().reduce(|a, b| {
        Rect::new(
            Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
            Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
        )
    })
}

fn ring_pixels(frame: &Frame, ring: &LineString<f64>) -> Vec<PixelPoint<i32>> {
    let mut pts: Vec<PixelPoint<i32>> = Vec::with_capacity(ring.0.len());
    for c in ring.coords() {
        let (x, y) = frame.to_pixel(*c);
        let p = PixelPoint::new(x.round() as i32, y.round() as i32);
        if pts.last() != Some(&p) {
            pts.push(p);
        }
    }
    // imageproc closes polygons itself and rejects an explicit closing point
    while pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    pts
}

fn stroke_ring(img: &mut RgbaImage, frame: &Frame, ring: &LineString<f64>, color: Rgba<u8>) {
    for line in ring.lines() {
        draw_line_segment_mut(img, frame.to_pixel(line.start), frame.to_pixel(line.end), color);
    }
}

fn fill_multipolygon(img: &mut RgbaImage, frame: &Frame, mp: &MultiPolygon<f64>, fill: Rgba<u8>, edge: Option<Rgba<u8>>) {
    for polygon in mp {
        let exterior = ring_pixels(frame, polygon.exterior());
        if exterior.len() >= 3 {
            draw_polygon_mut(img, &exterior, fill);
        }
        for hole in polygon.interiors() {
            let pts = ring_pixels(frame, hole);
            if pts.len() >= 3 {
                draw_polygon_mut(img, &pts, BACKGROUND);
            }
        }
        if let Some(edge) = edge {
            stroke_ring(img, frame, polygon.exterior(), edge);
            for hole in polygon.interiors() {
                stroke_ring(img, frame, hole, edge);
            }
        }
    }
}

fn filled_rect(img: &mut RgbaImage, x: f64, y: f64, w: f64, h: f64, color: Rgba<u8>) {
    let (w, h) = (w.round() as i64, h.round() as i64);
    if w > 0 && h > 0 {
        draw_filled_rect_mut(
            img,
            PixelRect::at(x.round() as i32, y.round() as i32).of_size(w as u32, h as u32),
            color,
        );
    }
}

fn save(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    img.save(path).with_context(|| format!("Failed to save image {:?}", path))
}

fn blank(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, BACKGROUND)
}

fn label_font() -> Result<Font<'static>> {
    Font::try_from_bytes(LABEL_FONT).ok_or_else(|| anyhow!("Bundled label font could not be parsed"))
}

/// Draws `text` with its top edge at `y`, centred on `x` (or ending at `x`
/// when `right_align` is set).
fn draw_label(img: &mut RgbaImage, font: &Font, text: &str, x: f64, y: f64, size: f32, right_align: bool) {
    let scale = Scale::uniform(size);
    let (text_w, _) = text_size(scale, font, text);
    let left = if right_align { x - text_w as f64 } else { x - text_w as f64 / 2.0 };
    draw_text_mut(img, TEXT, left.round() as i32, y.round() as i32, scale, font, text);
}

/// Grouped bars for the first `limit` aggregate rows: one group per tract,
/// non-chain on the left, chain on the right, labelled with the tract id.
pub fn bar_chart(path: &Path, records: &[AggregateRecord], limit: usize, width: u32, height: u32) -> Result<()> {
    let rows = &records[..records.len().min(limit)];
    let mut groups: Vec<(&str, [u64; 2])> = Vec::new();
    for r in rows {
        let slot = match groups.iter().position(|(id, _)| *id == r.tract_id) {
            Some(i) => i,
            None => {
                groups.push((r.tract_id.as_str(), [0, 0]));
                groups.len() - 1
            }
        };
        groups[slot].1[usize::from(r.is_chain)] = r.count;
    }

    let font = label_font()?;
    let mut img = blank(width, height);
    let (w, h) = (width as f64, height as f64);
    // room for the title and legend above, tick labels and axis title below
    let (left, top, bottom) = (PAD * 1.5, PAD * 1.5, PAD * 2.0);
    let right = w - PAD;
    let baseline = h - bottom;
    let plot_h = (baseline - top).max(1.0);
    let max = groups.iter().flat_map(|(_, c)| c.iter()).copied().max().unwrap_or(0).max(1);

    if !groups.is_empty() {
        let group_w = (right - left) / groups.len() as f64;
        let bar_w = group_w * 0.4;
        for (g, (tract_id, counts)) in groups.iter().enumerate() {
            let x0 = left + g as f64 * group_w;
            for (k, color) in [NON_CHAIN_BAR, CHAIN_BAR].into_iter().enumerate() {
                let bar_h = counts[k] as f64 / max as f64 * plot_h;
                filled_rect(&mut img, x0 + group_w * 0.1 + k as f64 * bar_w, baseline - bar_h, bar_w, bar_h, color);
            }
            draw_label(&mut img, &font, tract_id, x0 + group_w / 2.0, baseline + 6.0, 11.0, false);
        }
    }

    draw_line_segment_mut(&mut img, (left as f32, baseline as f32), (right as f32, baseline as f32), AXIS);
    draw_line_segment_mut(&mut img, (left as f32, top as f32), (left as f32, baseline as f32), AXIS);
    for (value, y) in [(0, baseline), (max, top)] {
        draw_line_segment_mut(&mut img, ((left - 4.0) as f32, y as f32), (left as f32, y as f32), AXIS);
        draw_label(&mut img, &font, &value.to_string(), left - 6.0, y - 6.0, 12.0, true);
    }

    draw_label(&mut img, &font, "Number of Chain and Non-chain Restaurants by Census Tract", w / 2.0, 10.0, 18.0, false);
    draw_label(&mut img, &font, "count", left, top - 22.0, 14.0, false);
    draw_label(&mut img, &font, "Census Tract ID", (left + right) / 2.0, h - 30.0, 14.0, false);

    let legend_x = right - 100.0;
    for (i, (name, color)) in [("Non-Chain", NON_CHAIN_BAR), ("Chain", CHAIN_BAR)].into_iter().enumerate() {
        let y = top - 24.0 + i as f64 * 14.0;
        filled_rect(&mut img, legend_x, y, 16.0, 10.0, color);
        draw_label(&mut img, &font, name, legend_x + 90.0, y - 1.0, 11.0, true);
    }

    save(&img, path)
}

/// Tracts as orange shapes with white borders and points as red dots.
/// Geometries must share one projected CRS.
pub fn tract_points_map(
    path: &Path,
    tracts: &[MultiPolygon<f64>],
    points: &[Point<f64>],
    width: u32,
    height: u32,
) -> Result<()> {
    let bounds = union_bounds(tracts.iter().filter_map(|t| t.bounding_rect()))
        .ok_or_else(|| anyhow!("Nothing to draw: no tract geometry"))?;
    let frame = Frame::fit(bounds, width, height, true);

    let mut img = blank(width, height);
    for tract in tracts {
        fill_multipolygon(&mut img, &frame, tract, TRACT_FILL, Some(EDGE));
    }
    for p in points {
        let (x, y) = frame.to_pixel(p.0);
        draw_filled_circle_mut(&mut img, (x.round() as i32, y.round() as i32), 2, POINT);
    }
    save(&img, path)
}

/// Quantile class breaks (upper bounds), linear interpolation between order
/// statistics.
pub fn quantile_breaks(values: &[f64], classes: usize) -> Vec<f64> {
    if values.is_empty() || classes == 0 {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let last = (sorted.len() - 1) as f64;
    let mut breaks: Vec<f64> = (1..=classes)
        .map(|k| {
            let pos = last * k as f64 / classes as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        })
        .collect();
    breaks.dedup();
    breaks
}

/// Index of the first break not below `value`.
pub fn classify(value: f64, breaks: &[f64]) -> usize {
    breaks
        .iter()
        .position(|b| value <= *b)
        .unwrap_or(breaks.len().saturating_sub(1))
}

/// Quantile choropleth of tract values with a swatch legend.
pub fn choropleth(path: &Path, units: &[TractValue], width: u32, height: u32) -> Result<()> {
    let bounds = union_bounds(units.iter().filter_map(|u| u.geometry.bounding_rect()))
        .ok_or_else(|| anyhow!("Nothing to draw: no tract geometry"))?;
    let frame = Frame::fit(bounds, width, height, true);

    let values: Vec<f64> = units.iter().map(|u| u.value).collect();
    let breaks = quantile_breaks(&values, QUANTILE_PALETTE.len());
    // fewer distinct breaks than colours: spread them over the palette
    let stride = QUANTILE_PALETTE.len() / breaks.len().max(1);
    let offset = QUANTILE_PALETTE.len() - stride * breaks.len().max(1);

    let mut img = blank(width, height);
    for unit in units {
        let class = classify(unit.value, &breaks);
        let color = QUANTILE_PALETTE[(offset + class * stride).min(QUANTILE_PALETTE.len() - 1)];
        fill_multipolygon(&mut img, &frame, &unit.geometry, color, Some(EDGE));
    }

    for (i, color) in QUANTILE_PALETTE.iter().enumerate() {
        filled_rect(&mut img, 10.0, 10.0 + i as f64 * 18.0, 24.0, 14.0, *color);
    }
    save(&img, path)
}

fn scatter_frame(x: &[f64], y: &[f64], width: u32, height: u32) -> Frame {
    let extent = x
        .iter()
        .chain(y)
        .fold(1.0_f64, |acc, v| if v.is_finite() { acc.max(v.abs()) } else { acc })
        * 1.1;
    let bounds = Rect::new(Coord { x: -extent, y: -extent }, Coord { x: extent, y: extent });
    Frame::fit(bounds, width, height, true)
}

fn draw_scatter_axes(img: &mut RgbaImage, frame: &Frame, extent: f64) {
    let h = [Coord { x: -extent, y: 0.0 }, Coord { x: extent, y: 0.0 }];
    let v = [Coord { x: 0.0, y: -extent }, Coord { x: 0.0, y: extent }];
    draw_line_segment_mut(img, frame.to_pixel(h[0]), frame.to_pixel(h[1]), AXIS);
    draw_line_segment_mut(img, frame.to_pixel(v[0]), frame.to_pixel(v[1]), AXIS);
}

/// Moran scatterplot: standardized value against its spatial lag, with the
/// fitted line whose slope is Moran's I.
pub fn moran_scatter(path: &Path, z: &[f64], lag: &[f64], slope: f64, width: u32, height: u32) -> Result<()> {
    if z.len() != lag.len() {
        return Err(anyhow!("Scatter needs matching x and y ({} vs {})", z.len(), lag.len()));
    }
    let frame = scatter_frame(z, lag, width, height);
    let extent = (frame.min.x).abs();

    let mut img = blank(width, height);
    draw_scatter_axes(&mut img, &frame, extent);
    for (&x, &y) in z.iter().zip(lag) {
        let (px, py) = frame.to_pixel(Coord { x, y });
        draw_filled_circle_mut(&mut img, (px.round() as i32, py.round() as i32), 3, NON_CHAIN_BAR);
    }
    let fit_start = frame.to_pixel(Coord { x: -extent, y: -extent * slope });
    let fit_end = frame.to_pixel(Coord { x: extent, y: extent * slope });
    draw_line_segment_mut(&mut img, fit_start, fit_end, POINT);
    save(&img, path)
}

/// Moran scatterplot coloured by LISA quadrant; non-significant units grey.
pub fn lisa_scatter(path: &Path, lisa: &[LocalMoran], width: u32, height: u32) -> Result<()> {
    let z: Vec<f64> = lisa.iter().map(|l| l.z).collect();
    let lag: Vec<f64> = lisa.iter().map(|l| l.lag).collect();
    let frame = scatter_frame(&z, &lag, width, height);
    let extent = (frame.min.x).abs();

    let mut img = blank(width, height);
    draw_scatter_axes(&mut img, &frame, extent);
    for local in lisa {
        let (px, py) = frame.to_pixel(Coord { x: local.z, y: local.lag });
        draw_filled_circle_mut(&mut img, (px.round() as i32, py.round() as i32), 4, lisa_color(local));
    }
    save(&img, path)
}

/// Tracts coloured by significant LISA quadrant.
pub fn lisa_cluster_map(
    path: &Path,
    geometries: &[MultiPolygon<f64>],
    lisa: &[LocalMoran],
    width: u32,
    height: u32,
) -> Result<()> {
    if geometries.len() != lisa.len() {
        return Err(anyhow!("{} geometries but {} LISA values", geometries.len(), lisa.len()));
    }
    let bounds = union_bounds(geometries.iter().filter_map(|g| g.bounding_rect()))
        .ok_or_else(|| anyhow!("Nothing to draw: no tract geometry"))?;
    let frame = Frame::fit(bounds, width, height, true);

    let mut img = blank(width, height);
    for (geometry, local) in geometries.iter().zip(lisa) {
        fill_multipolygon(&mut img, &frame, geometry, lisa_color(local), Some(EDGE));
    }
    let legend = [
        quadrant_color(Quadrant::HighHigh),
        quadrant_color(Quadrant::LowHigh),
        quadrant_color(Quadrant::LowLow),
        quadrant_color(Quadrant::HighLow),
        NOT_SIGNIFICANT,
    ];
    for (i, color) in legend.iter().enumerate() {
        filled_rect(&mut img, 10.0, 10.0 + i as f64 * 18.0, 24.0, 14.0, *color);
    }
    save(&img, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]])
    }

    fn local(quadrant: Quadrant, significant: bool) -> LocalMoran {
        LocalMoran { statistic: 0.5, z: 1.0, lag: 1.0, quadrant, p_sim: 0.01, significant }
    }

    #[test]
    fn quantile_breaks_split_evenly() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let breaks = quantile_breaks(&values, 5);
        let expected = [2.8, 4.6, 6.4, 8.2, 10.0];
        assert_eq!(breaks.len(), expected.len());
        for (got, want) in breaks.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
        assert_eq!(classify(1.0, &breaks), 0);
        assert_eq!(classify(5.0, &breaks), 2);
        assert_eq!(classify(10.0, &breaks), 4);
        assert_eq!(classify(99.0, &breaks), 4);
        assert_eq!(quantile_breaks(&[3.0, 3.0, 3.0], 5), vec![3.0]);
        assert!(quantile_breaks(&[], 5).is_empty());
    }

    #[test]
    fn map_fills_tracts_and_marks_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.png");
        let tracts = vec![square(0.0, 0.0, 100.0)];
        tract_points_map(&path, &tracts, &[Point::new(50.0, 50.0)], 200, 200).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (200, 200));
        assert_eq!(*img.get_pixel(100, 100), POINT);
        assert_eq!(*img.get_pixel(70, 70), TRACT_FILL);
        assert_eq!(*img.get_pixel(5, 5), BACKGROUND);
    }

    #[test]
    fn empty_map_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(tract_points_map(&dir.path().join("x.png"), &[], &[], 100, 100).is_err());
    }

    #[test]
    fn choropleth_uses_palette_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("choropleth.png");
        let units: Vec<TractValue> = (0..5)
            .map(|i| TractValue {
                tract_id: i.to_string(),
                geometry: square(i as f64 * 100.0, 0.0, 100.0),
                value: i as f64,
            })
            .collect();
        choropleth(&path, &units, 540, 200).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        // frame: 460 px for 500 units, centred vertically
        assert_eq!(*img.get_pixel(85, 100), QUANTILE_PALETTE[0]);
        assert_eq!(*img.get_pixel(455, 100), QUANTILE_PALETTE[4]);
    }

    #[test]
    fn lisa_map_greys_out_insignificant_tracts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lisa.png");
        let geometries = vec![square(0.0, 0.0, 100.0), square(100.0, 0.0, 100.0)];
        let lisa = vec![local(Quadrant::HighHigh, true), local(Quadrant::LowLow, false)];
        lisa_cluster_map(&path, &geometries, &lisa, 280, 200).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(*img.get_pixel(90, 100), quadrant_color(Quadrant::HighHigh));
        assert_eq!(*img.get_pixel(190, 100), NOT_SIGNIFICANT);
        assert!(lisa_cluster_map(&path, &geometries, &lisa[..1], 280, 200).is_err());
    }

    fn inked(img: &RgbaImage, x: std::ops::Range<u32>, y: std::ops::Range<u32>) -> usize {
        y.flat_map(|py| x.clone().map(move |px| (px, py)))
            .filter(|&(px, py)| *img.get_pixel(px, py) != BACKGROUND)
            .count()
    }

    #[test]
    fn bar_chart_carries_tract_labels_and_titles() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            AggregateRecord { tract_id: "9330001.01".into(), is_chain: false, count: 3, total_count: 3, density: None },
            AggregateRecord { tract_id: "9330002.00".into(), is_chain: true, count: 1, total_count: 1, density: None },
        ];
        let path = dir.path().join("bars.png");
        bar_chart(&path, &records, 20, 600, 400).unwrap();
        let img = image::open(&path).unwrap().to_rgba8();

        // baseline at y = 320: tick labels sit just below it, under each group
        assert!(inked(&img, 100..220, 324..342) > 0, "first tract id missing");
        assert!(inked(&img, 360..480, 324..342) > 0, "second tract id missing");
        // axis title near the bottom edge, chart title across the top
        assert!(inked(&img, 240..420, 370..390) > 0);
        assert!(inked(&img, 100..500, 8..30) > 0);
        // nothing drawn between the groups below the axis
        assert_eq!(inked(&img, 284..296, 324..342), 0);
    }

    #[test]
    fn charts_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            AggregateRecord { tract_id: "a".into(), is_chain: false, count: 4, total_count: 6, density: Some(4.0) },
            AggregateRecord { tract_id: "a".into(), is_chain: true, count: 2, total_count: 6, density: Some(2.0) },
        ];
        let bars = dir.path().join("bars.png");
        bar_chart(&bars, &records, 20, 300, 200).unwrap();
        let img = image::open(&bars).unwrap().to_rgba8();
        // plot area spans y 60..120; the non-chain bar fills it, the chain bar half
        assert_eq!(*img.get_pixel(100, 62), NON_CHAIN_BAR);
        assert_eq!(*img.get_pixel(200, 110), CHAIN_BAR);
        assert_eq!(*img.get_pixel(200, 70), BACKGROUND);

        let scatter = dir.path().join("scatter.png");
        moran_scatter(&scatter, &[-1.0, 0.5, 1.0], &[-0.8, 0.2, 0.9], 0.7, 200, 200).unwrap();
        assert!(scatter.exists());
        assert!(moran_scatter(&scatter, &[1.0], &[], 0.7, 200, 200).is_err());

        let lisa_path = dir.path().join("lisa_scatter.png");
        lisa_scatter(&lisa_path, &[local(Quadrant::HighLow, true)], 200, 200).unwrap();
        assert!(lisa_path.exists());
    }
}
