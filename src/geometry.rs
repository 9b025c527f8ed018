//! Geometry Enforcer - Precision, Closure, Opacity Tiers, Safe Zone
//!
//! Four text-in/text-out passes, always run in this order:
//! 1. precision normalization
//! 2. path closure
//! 3. opacity tiering
//! 4. safe-zone clamping
//!
//! Each pass is idempotent on its own output.

use std::f64::consts::PI;
use std::sync::LazyLock;

use regex::Regex;

use crate::markup::{self, format_coord, parse_length, StartTag};
use crate::protocol::{GeoProtocol, OpacityTier, SafeZoneSpec};

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d*\.(\d+)").expect("decimal regex is valid"));

static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[MmLlHhVvCcSsQqTtAaZz]|[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?")
        .expect("path token regex is valid")
});

/// Attributes and style properties that carry coordinates or dimensions.
/// Anything else (ids, `url(#...)` paint references, labels) is left verbatim.
const GEOMETRIC: [&str; 25] = [
    "x", "y", "x1", "y1", "x2", "y2", "cx", "cy", "r", "rx", "ry", "fx", "fy", "width", "height",
    "d", "points", "viewbox", "transform", "stroke-width", "font-size", "dx", "dy", "offset",
    "stroke-dashoffset",
];

const DRAWABLE: [&str; 13] = [
    "rect", "circle", "ellipse", "line", "polyline", "polygon", "path", "image", "use",
    "foreignobject", "text", "tspan", "textpath",
];

const TEXT_BEARING: [&str; 3] = ["text", "tspan", "textpath"];

const BOXED: [&str; 4] = ["rect", "image", "use", "foreignobject"];

pub struct GeometryEnforcer<'a> {
    protocol: &'a GeoProtocol,
    zone: SafeZoneSpec,
}

impl<'a> GeometryEnforcer<'a> {
    pub fn new(protocol: &'a GeoProtocol, canvas_width: f64, canvas_height: f64) -> Self {
        Self {
            protocol,
            zone: protocol.safe_zone(canvas_width, canvas_height),
        }
    }

    pub fn zone(&self) -> SafeZoneSpec {
        self.zone
    }

    /// Run all four passes in order.
    pub fn enforce(&self, doc: &str) -> String {
        let doc = normalize_precision(doc, self.protocol.precision);
        let doc = close_paths(&doc, self.protocol.closure_epsilon);
        let doc = apply_opacity_tiers(&doc, self.protocol, &self.zone);
        clamp_safe_zone(&doc, &self.zone, self.protocol.bleed)
    }
}

// --- Pass 1: precision ---

fn is_geometric(name: &str) -> bool {
    GEOMETRIC.iter().any(|g| name.trim().eq_ignore_ascii_case(g))
}

/// Round every decimal literal with more than `decimals` fractional digits
/// inside geometric attribute values and geometric `style` declarations.
pub fn normalize_precision(doc: &str, decimals: usize) -> String {
    markup::rewrite_start_tags(doc, |tag| {
        tag.map_values(|name, value| {
            if name.eq_ignore_ascii_case("style") {
                round_style(value, decimals)
            } else if is_geometric(name) {
                round_literals(value, decimals)
            } else {
                None
            }
        })
    })
}

fn round_style(style: &str, decimals: usize) -> Option<String> {
    let mut changed = false;
    let declarations: Vec<String> = style
        .split(';')
        .map(|decl| match decl.split_once(':') {
            Some((key, value)) if is_geometric(key) => match round_literals(value, decimals) {
                Some(rounded) => {
                    changed = true;
                    format!("{key}:{rounded}")
                }
                None => decl.to_string(),
            },
            _ => decl.to_string(),
        })
        .collect();
    changed.then(|| declarations.join(";"))
}

fn round_literals(value: &str, decimals: usize) -> Option<String> {
    if !DECIMAL.captures_iter(value).any(|c| c[1].len() > decimals) {
        return None;
    }
    let rounded = DECIMAL.replace_all(value, |c: &regex::Captures<'_>| {
        if c[1].len() <= decimals {
            return c[0].to_string();
        }
        match c[0].parse::<f64>() {
            Ok(v) => format!("{:.*}", decimals, v),
            Err(_) => c[0].to_string(),
        }
    });
    Some(rounded.into_owned())
}

// --- Pass 2: path closure ---

/// Where a path's last subpath starts and where the pen ends up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathTrace {
    pub subpath_start: (f64, f64),
    pub end: (f64, f64),
    pub segments: usize,
    pub closed: bool,
}

/// Walk path data, tracking absolute pen position through relative and
/// implicit commands. Returns `None` for data that does not start with a move.
pub fn trace_path(d: &str) -> Option<PathTrace> {
    let tokens: Vec<&str> = PATH_TOKEN.find_iter(d).map(|m| m.as_str()).collect();
    if !matches!(tokens.first(), Some(&"M") | Some(&"m")) {
        return None;
    }

    let mut pen = (0.0, 0.0);
    let mut start = (0.0, 0.0);
    let mut segments = 0usize;
    let mut closed = false;
    let mut command = 'M';
    let mut args: Vec<f64> = Vec::with_capacity(7);

    for token in tokens {
        let first = token.chars().next()?;
        if first.is_ascii_alphabetic() {
            if !args.is_empty() {
                return None;
            }
            command = first;
            if command.eq_ignore_ascii_case(&'z') {
                pen = start;
                segments += 1;
                closed = true;
            }
            continue;
        }

        args.push(token.parse().ok()?);
        let arity = match command.to_ascii_uppercase() {
            'M' | 'L' | 'T' => 2,
            'H' | 'V' => 1,
            'S' | 'Q' => 4,
            'C' => 6,
            'A' => 7,
            _ => return None,
        };
        if args.len() < arity {
            continue;
        }

        let relative = command.is_ascii_lowercase();
        let (ox, oy) = if relative { pen } else { (0.0, 0.0) };
        match command.to_ascii_uppercase() {
            'H' => pen.0 = ox + args[0],
            'V' => pen.1 = oy + args[0],
            _ => pen = (ox + args[arity - 2], oy + args[arity - 1]),
        }
        closed = false;

        if command.eq_ignore_ascii_case(&'m') {
            start = pen;
            segments = 0;
            // Extra pairs after a move are implicit line-tos.
            command = if relative { 'l' } else { 'L' };
        } else {
            segments += 1;
        }
        args.clear();
    }

    // A dangling partial command leaves the pen position undefined.
    if !args.is_empty() {
        return None;
    }

    Some(PathTrace {
        subpath_start: start,
        end: pen,
        segments,
        closed,
    })
}

/// Append `Z` to path data whose pen returns to the subpath start.
pub fn close_path_data(d: &str, epsilon: f64) -> Option<String> {
    let trace = trace_path(d)?;
    if trace.closed || trace.segments == 0 {
        return None;
    }
    let dx = (trace.end.0 - trace.subpath_start.0).abs();
    let dy = (trace.end.1 - trace.subpath_start.1).abs();
    if dx < epsilon && dy < epsilon {
        Some(format!("{} Z", d.trim_end()))
    } else {
        None
    }
}

pub fn close_paths(doc: &str, epsilon: f64) -> String {
    markup::rewrite_start_tags(doc, |tag| {
        if tag.local_name() != "path" {
            return None;
        }
        tag.map_values(|name, value| {
            if name == "d" {
                close_path_data(value, epsilon)
            } else {
                None
            }
        })
    })
}

// --- Pass 3: opacity tiers ---

/// Pick a tier for a drawable element by structure alone. Non-drawables
/// get `None`.
pub fn classify_tier(tag: &StartTag<'_>, protocol: &GeoProtocol, zone: &SafeZoneSpec) -> Option<OpacityTier> {
    let name = tag.local_name();
    if !DRAWABLE.contains(&name.as_str()) {
        return None;
    }
    if TEXT_BEARING.contains(&name.as_str()) {
        return Some(OpacityTier::Foreground);
    }

    let filled = tag
        .presentation("fill")
        .map_or(true, |f| !is_none_paint(f));
    let stroked = tag
        .presentation("stroke")
        .map_or(false, |s| !is_none_paint(s));
    let canvas_area = zone.canvas_width * zone.canvas_height;
    let large = element_area(tag, zone)
        .map_or(false, |area| area >= protocol.background_area_fraction * canvas_area);

    if filled && !stroked && large {
        Some(OpacityTier::Background)
    } else {
        Some(OpacityTier::Midground)
    }
}

fn is_none_paint(paint: &str) -> bool {
    let paint = paint.trim();
    paint.eq_ignore_ascii_case("none") || paint.eq_ignore_ascii_case("transparent")
}

fn element_area(tag: &StartTag<'_>, zone: &SafeZoneSpec) -> Option<f64> {
    let len = |name: &str, reference: f64| tag.attr(name).and_then(|v| parse_length(v, reference));
    let (w, h) = (zone.canvas_width, zone.canvas_height);
    match tag.local_name().as_str() {
        "circle" => len("r", w.min(h)).map(|r| PI * r * r),
        "ellipse" => Some(PI * len("rx", w)? * len("ry", h)?),
        _ => Some(len("width", w)? * len("height", h)?),
    }
}

/// Give every drawable element without an explicit opacity its tier value.
/// Explicit opacities are never touched.
pub fn apply_opacity_tiers(doc: &str, protocol: &GeoProtocol, zone: &SafeZoneSpec) -> String {
    markup::rewrite_start_tags(doc, |tag| {
        if tag.has_attr("opacity") || tag.style_property("opacity").is_some() {
            return None;
        }
        let tier = classify_tier(tag, protocol, zone)?;
        Some(tag.with_attr("opacity", &format!("{:.2}", tier.value())))
    })
}

// --- Pass 4: safe zone ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    pub fn is_bleed(&self) -> bool {
        self.x < 0.0 || self.y < 0.0
    }
}

/// Bleed boxes grow outward by `bleed` on each axis with a negative
/// origin. Everything else is pulled inside the margin.
pub fn clamp_box(b: ElementBox, zone: &SafeZoneSpec, bleed: f64) -> ElementBox {
    if b.is_bleed() {
        let (x, width) = if b.x < 0.0 { (b.x - bleed, b.width + bleed) } else { (b.x, b.width) };
        let (y, height) = if b.y < 0.0 { (b.y - bleed, b.height + bleed) } else { (b.y, b.height) };
        return ElementBox { x, y, width, height };
    }

    let margin = zone.margin();
    let (x, width) = clamp_axis(b.x, b.width, zone.canvas_width, margin);
    let (y, height) = clamp_axis(b.y, b.height, zone.canvas_height, margin);
    ElementBox { x, y, width, height }
}

fn clamp_axis(origin: f64, extent: f64, canvas: f64, margin: f64) -> (f64, f64) {
    let far = (canvas - margin).max(margin);
    let origin = origin.clamp(margin, far);
    let extent = extent.min(far - origin).max(0.0);
    (origin, extent)
}

pub fn clamp_safe_zone(doc: &str, zone: &SafeZoneSpec, bleed: f64) -> String {
    markup::rewrite_start_tags(doc, |tag| {
        if !BOXED.contains(&tag.local_name().as_str()) {
            return None;
        }
        let current = ElementBox {
            x: tag.numeric_attr("x")?,
            y: tag.numeric_attr("y")?,
            width: tag.numeric_attr("width")?,
            height: tag.numeric_attr("height")?,
        };
        let clamped = clamp_box(current, zone, bleed);
        if clamped == current {
            return None;
        }

        tag.map_values(|name, _| {
            let value = match name {
                "x" => clamped.x,
                "y" => clamped.y,
                "width" => clamped.width,
                "height" => clamped.height,
                _ => return None,
            };
            Some(format_coord(value))
        })
    })
}
