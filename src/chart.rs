//! Episode ratings chart: scales, hit-testing, tooltips and SVG output.
//!
//! Episodes are laid out by position in the aggregated sequence (x) and by
//! rating on a fixed 0..10 scale (y). All geometry lives in plot
//! coordinates, i.e. relative to the inner area inside the margins, except
//! pointer positions which are relative to the whole surface.

use crate::ratings::{AggregatedSeries, Episode};
use crate::tmdb::STILL_BASE;
use crate::utils::{coord, escape, rating_label};
use serde::Serialize;

pub const RATING_MAX: f64 = 10.0;
pub const TOOLTIP_WIDTH: f64 = 260.0;
pub const TOOLTIP_HEIGHT: f64 = 180.0;
pub const TOOLTIP_OFFSET: f64 = 12.0;
const RATING_TICKS: [f64; 6] = [0.0, 2.0, 4.0, 6.0, 8.0, 10.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartLayout {
    pub width: f64,
    pub height: f64,
    pub margin: Margin,
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 280.0,
            margin: Margin {
                top: 16.0,
                right: 16.0,
                bottom: 36.0,
                left: 40.0,
            },
        }
    }
}

impl ChartLayout {
    pub fn inner_width(&self) -> f64 {
        self.width - self.margin.left - self.margin.right
    }

    pub fn inner_height(&self) -> f64 {
        self.height - self.margin.top - self.margin.bottom
    }

    pub fn x_scale(&self, episode_count: usize) -> LinearScale {
        let last = episode_count.saturating_sub(1) as f64;
        LinearScale::new((0.0, last), (0.0, self.inner_width()))
    }

    pub fn y_scale(&self) -> LinearScale {
        LinearScale::new((0.0, RATING_MAX), (self.inner_height(), 0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    /// Maps a domain value into the range. A zero-width domain maps to the
    /// middle of the range.
    pub fn apply(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let t = if d1 == d0 { 0.5 } else { (value - d0) / (d1 - d0) };
        r0 + t * (r1 - r0)
    }

    /// Maps a range value back into the domain.
    pub fn invert(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let t = if r1 == r0 { 0.5 } else { (value - r0) / (r1 - r0) };
        d0 + t * (d1 - d0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub index: usize,
    pub rating: Option<f64>,
}

pub fn chart_points(episodes: &[Episode]) -> Vec<ChartPoint> {
    episodes
        .iter()
        .enumerate()
        .map(|(index, e)| ChartPoint {
            index,
            rating: e.rating(),
        })
        .collect()
}

/// SVG path data through rated points. An unrated point ends the current
/// segment; the next rated point starts a new one.
pub fn line_path(points: &[ChartPoint], x: &LinearScale, y: &LinearScale) -> String {
    let mut d = String::new();
    let mut pen_down = false;
    for p in points {
        match p.rating {
            Some(r) => {
                let cmd = if pen_down { 'L' } else { 'M' };
                if !d.is_empty() {
                    d.push(' ');
                }
                d.push_str(&format!(
                    "{cmd}{},{}",
                    coord(x.apply(p.index as f64)),
                    coord(y.apply(r))
                ));
                pen_down = true;
            }
            None => pen_down = false,
        }
    }
    d
}

/// Resolves an x-domain value to the nearest episode index, clamped to
/// `[0, episode_count - 1]`. `None` when there are no episodes.
pub fn index_at(domain_value: f64, episode_count: usize) -> Option<usize> {
    if episode_count == 0 {
        return None;
    }
    let last = (episode_count - 1) as f64;
    let rounded = domain_value.round();
    let clamped = if rounded.is_nan() {
        0.0
    } else {
        rounded.clamp(0.0, last)
    };
    Some(clamped as usize)
}

/// Hit-tests a pointer x relative to the whole surface.
pub fn hit_test(layout: &ChartLayout, episode_count: usize, pointer_x: f64) -> Option<usize> {
    let plot_x = pointer_x - layout.margin.left;
    index_at(layout.x_scale(episode_count).invert(plot_x), episode_count)
}

/// Places a fixed-size tooltip next to the pointer, flipping to the other
/// side of the pointer on overflow and clamping into the container.
pub fn place_tooltip(pointer: (f64, f64), container: (f64, f64)) -> (f64, f64) {
    let (px, py) = pointer;
    let (cw, ch) = container;
    let mut left = px + TOOLTIP_OFFSET;
    let mut top = py - TOOLTIP_OFFSET;
    if left + TOOLTIP_WIDTH > cw {
        left = px - TOOLTIP_OFFSET - TOOLTIP_WIDTH;
    }
    if top + TOOLTIP_HEIGHT > ch {
        top = py - TOOLTIP_OFFSET - TOOLTIP_HEIGHT;
    }
    let left = left.clamp(0.0, (cw - TOOLTIP_WIDTH).max(0.0));
    let top = top.clamp(0.0, (ch - TOOLTIP_HEIGHT).max(0.0));
    (left, top)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipContent {
    pub heading: String,
    pub still_url: Option<String>,
    pub rating: String,
}

impl TooltipContent {
    pub fn for_episode(e: &Episode) -> Self {
        Self {
            heading: format!(
                "S{:02}E{:02} · {}",
                e.season_number, e.episode_number, e.name
            ),
            still_url: e.still_path.as_ref().map(|p| format!("{STILL_BASE}{p}")),
            rating: format!("Rating: {}", rating_label(e.vote_average)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub index: usize,
    pub left: f64,
    pub top: f64,
    /// Highlighted episode position in plot coordinates.
    pub marker: (f64, f64),
    pub content: TooltipContent,
}

/// Interactive chart state for one aggregated series.
#[derive(Debug, Clone)]
pub struct ChartSurface {
    series: AggregatedSeries,
    layout: ChartLayout,
    tooltip: Option<Tooltip>,
}

impl ChartSurface {
    pub fn new(series: AggregatedSeries) -> Self {
        Self::with_layout(series, ChartLayout::default())
    }

    pub fn with_layout(series: AggregatedSeries, layout: ChartLayout) -> Self {
        Self {
            series,
            layout,
            tooltip: None,
        }
    }

    pub fn series(&self) -> &AggregatedSeries {
        &self.series
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    /// Pointer moved to `(x, y)`, relative to the surface's top-left corner.
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Option<&Tooltip> {
        let n = self.series.episodes.len();
        let Some(index) = hit_test(&self.layout, n, x) else {
            self.tooltip = None;
            return None;
        };
        let episode = &self.series.episodes[index];
        let (left, top) = place_tooltip((x, y), (self.layout.width, self.layout.height));
        let marker = (
            self.layout.x_scale(n).apply(index as f64),
            self.layout.y_scale().apply(episode.rating().unwrap_or(0.0)),
        );
        self.tooltip = Some(Tooltip {
            index,
            left,
            top,
            marker,
            content: TooltipContent::for_episode(episode),
        });
        self.tooltip.as_ref()
    }

    pub fn pointer_leave(&mut self) {
        self.tooltip = None;
    }

    pub fn render_svg(&self) -> String {
        render_svg(&self.series, &self.layout)
    }
}

/// Renders the chart as a standalone SVG document.
///
/// Each episode gets a transparent hover band covering the x-range that
/// [`hit_test`] resolves to it. Hovering a band reveals the episode's marker
/// dot and a tooltip card placed with [`place_tooltip`].
pub fn render_svg(series: &AggregatedSeries, layout: &ChartLayout) -> String {
    let n = series.episodes.len();
    let x = layout.x_scale(n);
    let y = layout.y_scale();
    let iw = layout.inner_width();
    let ih = layout.inner_height();
    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" role="img" aria-label="Episode ratings">"#,
        w = coord(layout.width),
        h = coord(layout.height)
    ));
    svg.push_str(
        "<style>.ep .dot,.ep .tip{opacity:0}.ep:hover .dot,.ep:hover .tip{opacity:1}.tip{pointer-events:none}text{font-family:sans-serif}</style>",
    );
    svg.push_str(&format!(
        r#"<g transform="translate({},{})">"#,
        coord(layout.margin.left),
        coord(layout.margin.top)
    ));

    svg.push_str(&format!(
        r##"<line x1="0" x2="0" y1="0" y2="{}" stroke="#222"/>"##,
        coord(ih)
    ));
    for tick in RATING_TICKS {
        let ty = coord(y.apply(tick));
        svg.push_str(&format!(
            r##"<line x1="-6" x2="0" y1="{ty}" y2="{ty}" stroke="#222"/><text x="-9" y="{ty}" dy="0.32em" text-anchor="end" font-size="10" fill="#222">{tick}</text>"##
        ));
    }
    let mid = coord(ih / 2.0);
    svg.push_str(&format!(
        r##"<text x="-20" y="{mid}" text-anchor="middle" font-size="12" fill="#6b7280" transform="rotate(-90, -20, {mid})">Rating</text>"##
    ));

    for b in &series.boundaries {
        let bx = coord(x.apply(b.index as f64));
        svg.push_str(&format!(
            r##"<g class="season"><line x1="{bx}" x2="{bx}" y1="0" y2="{}" stroke="#e5e7eb" stroke-dasharray="4,4"/><text x="{bx}" y="{}" text-anchor="middle" font-size="12" fill="#6b7280">S{}</text></g>"##,
            coord(ih),
            coord(ih + 20.0),
            b.season
        ));
    }

    if let Some(avg) = series.overall_average {
        let ay = y.apply(avg);
        svg.push_str(&format!(
            r#"<g class="average"><line x1="0" x2="{}" y1="{ay}" y2="{ay}" stroke="red" stroke-width="1"/><text x="12" y="{}" text-anchor="start" font-size="10" fill="red">Average episode rating: {:.1}</text></g>"#,
            coord(iw),
            coord(ay + 16.0),
            avg,
            ay = coord(ay)
        ));
    }

    let d = line_path(&chart_points(&series.episodes), &x, &y);
    if !d.is_empty() {
        svg.push_str(&format!(
            r##"<path d="{d}" fill="none" stroke="#111827" stroke-width="2"/>"##
        ));
    }

    for (index, e) in series.episodes.iter().enumerate() {
        let (x0, x1) = hover_band(&x, index, n, iw);
        let cx = x.apply(index as f64);
        let cy = y.apply(e.rating().unwrap_or(0.0));
        let content = TooltipContent::for_episode(e);
        let (left, top) = band_tooltip_position(layout, (x0 + x1) / 2.0, cy);
        svg.push_str(&format!(
            r##"<g class="ep"><rect x="{}" y="0" width="{}" height="{}" fill="transparent"><title>{}&#10;{}</title></rect><circle class="dot" cx="{}" cy="{}" r="3" fill="#111827"/>"##,
            coord(x0),
            coord(x1 - x0),
            coord(ih),
            escape(&content.heading),
            escape(&content.rating),
            coord(cx),
            coord(cy)
        ));
        svg.push_str(&tooltip_card(
            &content,
            left - layout.margin.left,
            top - layout.margin.top,
        ));
        svg.push_str("</g>");
    }

    svg.push_str("</g></svg>");
    svg
}

// Rounding flips to the next index halfway between two episodes, so each
// band spans half a step either side, clipped to the plot.
fn hover_band(x: &LinearScale, index: usize, n: usize, inner_width: f64) -> (f64, f64) {
    if n <= 1 {
        return (0.0, inner_width);
    }
    let i = index as f64;
    let x0 = x.apply(i - 0.5).max(0.0);
    let x1 = x.apply(i + 0.5).min(inner_width);
    (x0, x1)
}

/// Tooltip corner, in surface coordinates, for a pointer resting on a band's
/// centre at the marker's height.
fn band_tooltip_position(layout: &ChartLayout, band_center: f64, marker_y: f64) -> (f64, f64) {
    place_tooltip(
        (
            layout.margin.left + band_center,
            layout.margin.top + marker_y,
        ),
        (layout.width, layout.height),
    )
}

// Card origin is in plot coordinates; the still fills the top at 16:9.
fn tooltip_card(content: &TooltipContent, left: f64, top: f64) -> String {
    let pad = 8.0;
    let mut card = format!(
        r##"<g class="tip" transform="translate({},{})"><rect width="{}" height="{}" rx="6" fill="#fff" stroke="#e5e7eb"/>"##,
        coord(left),
        coord(top),
        coord(TOOLTIP_WIDTH),
        coord(TOOLTIP_HEIGHT)
    );
    let text_y = match &content.still_url {
        Some(url) => {
            let w = TOOLTIP_WIDTH - 2.0 * pad;
            card.push_str(&format!(
                r#"<image href="{}" x="{p}" y="{p}" width="{}" height="{}" preserveAspectRatio="xMidYMid slice"/>"#,
                escape(url),
                coord(w),
                coord(w * 9.0 / 16.0),
                p = coord(pad)
            ));
            TOOLTIP_HEIGHT - 22.0
        }
        None => 24.0,
    };
    card.push_str(&format!(
        r##"<text x="{p}" y="{}" font-size="12" font-weight="600" fill="#111827">{}</text><text x="{p}" y="{}" font-size="11" fill="#6b7280">{}</text></g>"##,
        coord(text_y),
        escape(&content.heading),
        coord(text_y + 14.0),
        escape(&content.rating),
        p = coord(pad)
    ));
    card
}
