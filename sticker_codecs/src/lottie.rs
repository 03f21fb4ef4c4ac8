//! A small Lottie rasteriser, enough for flat sticker artwork.
//!
//! Supported: solid layers, shape layers made of rectangles and ellipses with
//! solid fills, nested groups, layer and group transforms (anchor, position,
//! scale, rotation, opacity) with linear keyframe interpolation, layer in/out
//! points and the hidden flag. Everything else (masks, mattes, strokes,
//! gradients, paths, parenting, easing curves) is skipped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use sticker_core::vector::{VectorBackend, VectorProgram};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

// ── Document model ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LottieDocument {
    #[serde(default)]
    pub v: Option<String>,
    pub fr: f32,
    pub ip: f32,
    pub op: f32,
    pub w: u32,
    pub h: u32,
    #[serde(default)]
    layers: Vec<Layer>,
}

impl LottieDocument {
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let doc: LottieDocument = serde_json::from_slice(data)?;
        if doc.w == 0 || doc.h == 0 {
            anyhow::bail!("lottie composition has empty size {}x{}", doc.w, doc.h);
        }
        if !(doc.op > doc.ip) {
            anyhow::bail!("lottie out point {} is not after in point {}", doc.op, doc.ip);
        }
        Ok(doc)
    }

    pub fn frame_count(&self) -> u32 {
        ((self.op - self.ip).ceil() as u32).max(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Components {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl Components {
    fn to_vec(&self) -> Vec<f32> {
        match self {
            Components::Scalar(v) => vec![*v],
            Components::Vector(v) => v.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Keyframe {
    t: f32,
    #[serde(default)]
    s: Option<Components>,
    #[serde(default)]
    e: Option<Components>,
    /// Hold keyframe: jump instead of interpolating.
    #[serde(default)]
    h: u8,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PropertyValue {
    Animated(Vec<Keyframe>),
    Static(Components),
}

#[derive(Debug, Deserialize)]
struct Property {
    k: PropertyValue,
}

impl Property {
    /// Value at `frame`, falling back to `default` for missing components.
    fn sample(&self, frame: f32, default: &[f32]) -> Vec<f32> {
        let value = match &self.k {
            PropertyValue::Static(c) => c.to_vec(),
            PropertyValue::Animated(keys) => sample_keyframes(keys, frame),
        };
        default
            .iter()
            .enumerate()
            .map(|(i, d)| value.get(i).copied().unwrap_or(*d))
            .collect()
    }
}

fn sample_keyframes(keys: &[Keyframe], frame: f32) -> Vec<f32> {
    let start_of = |k: &Keyframe| k.s.as_ref().map(Components::to_vec);
    let Some(first) = keys.first() else {
        return Vec::new();
    };
    if frame < first.t {
        return start_of(first).unwrap_or_default();
    }
    for pair in keys.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        if frame >= from.t && frame < to.t {
            let start = start_of(from).unwrap_or_default();
            if from.h == 1 {
                return start;
            }
            let end = from
                .e
                .as_ref()
                .map(Components::to_vec)
                .or_else(|| start_of(to))
                .unwrap_or_else(|| start.clone());
            let span = to.t - from.t;
            let t = if span > 0.0 { (frame - from.t) / span } else { 0.0 };
            return start
                .iter()
                .zip(end.iter().chain(std::iter::repeat(&0.0)))
                .map(|(a, b)| a + (b - a) * t)
                .collect();
        }
    }
    // Past the last keyframe: Lottie files often close with a bare `t`, so
    // walk back to the last keyframe that carries a value.
    keys.iter()
        .rev()
        .find_map(|k| start_of(k).or_else(|| k.e.as_ref().map(Components::to_vec)))
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
struct LayerTransform {
    #[serde(default)]
    a: Option<Property>,
    #[serde(default)]
    p: Option<Property>,
    #[serde(default)]
    s: Option<Property>,
    #[serde(default)]
    r: Option<Property>,
    #[serde(default)]
    o: Option<Property>,
}

impl LayerTransform {
    fn resolve(&self, frame: f32) -> (Transform, f32) {
        let get = |p: &Option<Property>, default: &[f32]| match p {
            Some(p) => p.sample(frame, default),
            None => default.to_vec(),
        };
        let anchor = get(&self.a, &[0.0, 0.0]);
        let position = get(&self.p, &[0.0, 0.0]);
        let scale = get(&self.s, &[100.0, 100.0]);
        let rotation = get(&self.r, &[0.0]);
        let opacity = get(&self.o, &[100.0]);

        let transform = Transform::from_translate(position[0], position[1])
            .pre_rotate(rotation[0])
            .pre_scale(scale[0] / 100.0, scale[1] / 100.0)
            .pre_translate(-anchor[0], -anchor[1]);
        (transform, (opacity[0] / 100.0).clamp(0.0, 1.0))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "ty")]
enum ShapeItem {
    #[serde(rename = "gr")]
    Group {
        #[serde(default)]
        it: Vec<ShapeItem>,
        #[serde(default)]
        hd: bool,
    },
    #[serde(rename = "rc")]
    Rect { p: Property, s: Property },
    #[serde(rename = "el")]
    Ellipse { p: Property, s: Property },
    #[serde(rename = "fl")]
    Fill {
        c: Property,
        #[serde(default)]
        o: Option<Property>,
    },
    #[serde(rename = "tr")]
    Transform(LayerTransform),
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct Layer {
    ty: u8,
    #[serde(default)]
    ks: LayerTransform,
    ip: f32,
    op: f32,
    #[serde(default)]
    hd: bool,
    /// Solid layer colour, `#rrggbb`.
    #[serde(default)]
    sc: Option<String>,
    #[serde(default)]
    sw: Option<f32>,
    #[serde(default)]
    sh: Option<f32>,
    #[serde(default)]
    shapes: Vec<ShapeItem>,
}

const LAYER_SOLID: u8 = 1;
const LAYER_SHAPE: u8 = 4;

// ── Rasteriser ─────────────────────────────────────────────────────────────

fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// Lottie colours are 0..1 floats; very old exports use 0..255.
fn fill_color(c: &[f32]) -> [u8; 3] {
    let scale = if c.iter().take(3).any(|v| *v > 1.0) { 1.0 } else { 255.0 };
    let to_u8 = |v: f32| (v * scale).round().clamp(0.0, 255.0) as u8;
    [to_u8(c[0]), to_u8(c[1]), to_u8(c[2])]
}

fn paint(rgb: [u8; 3], alpha: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.anti_alias = true;
    let a = (alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    paint.set_color_rgba8(rgb[0], rgb[1], rgb[2], a);
    paint
}

fn draw_shapes(
    pixmap: &mut Pixmap,
    items: &[ShapeItem],
    frame: f32,
    parent: Transform,
    parent_alpha: f32,
) {
    let (local, alpha) = items
        .iter()
        .find_map(|item| match item {
            ShapeItem::Transform(tr) => Some(tr.resolve(frame)),
            _ => None,
        })
        .unwrap_or((Transform::identity(), 1.0));
    let transform = parent.pre_concat(local);
    let alpha = parent_alpha * alpha;

    // Earlier items sit on top, so paint back to front.
    for item in items.iter().rev() {
        if let ShapeItem::Group { it, hd: false } = item {
            draw_shapes(pixmap, it, frame, transform, alpha);
        }
    }

    let Some((rgb, fill_alpha)) = items.iter().find_map(|item| match item {
        ShapeItem::Fill { c, o } => {
            let color = fill_color(&c.sample(frame, &[0.0, 0.0, 0.0]));
            let opacity = o.as_ref().map_or(100.0, |o| o.sample(frame, &[100.0])[0]);
            Some((color, (opacity / 100.0).clamp(0.0, 1.0)))
        }
        _ => None,
    }) else {
        return;
    };
    let paint = paint(rgb, alpha * fill_alpha);

    for item in items.iter().rev() {
        let path = match item {
            ShapeItem::Rect { p, s } | ShapeItem::Ellipse { p, s } => {
                let center = p.sample(frame, &[0.0, 0.0]);
                let size = s.sample(frame, &[0.0, 0.0]);
                let Some(rect) = Rect::from_xywh(
                    center[0] - size[0] / 2.0,
                    center[1] - size[1] / 2.0,
                    size[0],
                    size[1],
                ) else {
                    continue;
                };
                if matches!(item, ShapeItem::Rect { .. }) {
                    Some(PathBuilder::from_rect(rect))
                } else {
                    PathBuilder::from_oval(rect)
                }
            }
            _ => None,
        };
        if let Some(path) = path {
            pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
        }
    }
}

fn draw_layer(pixmap: &mut Pixmap, layer: &Layer, frame: f32, canvas: Transform) {
    if layer.hd || frame < layer.ip || frame >= layer.op {
        return;
    }
    let (local, alpha) = layer.ks.resolve(frame);
    let transform = canvas.pre_concat(local);

    match layer.ty {
        LAYER_SOLID => {
            let (Some(color), Some(w), Some(h)) = (
                layer.sc.as_deref().and_then(parse_hex_color),
                layer.sw,
                layer.sh,
            ) else {
                return;
            };
            if let Some(rect) = Rect::from_xywh(0.0, 0.0, w, h) {
                pixmap.fill_rect(rect, &paint(color, alpha), transform, None);
            }
        }
        LAYER_SHAPE => draw_shapes(pixmap, &layer.shapes, frame, transform, alpha),
        other => log::trace!("skipping unsupported lottie layer type {other}"),
    }
}

// ── Backend ────────────────────────────────────────────────────────────────

/// One playing instance of a shared, parsed document.
pub struct LottieProgram {
    doc: Arc<LottieDocument>,
    pixmap: Option<Pixmap>,
}

impl LottieProgram {
    pub fn new(doc: Arc<LottieDocument>) -> Self {
        Self { doc, pixmap: None }
    }
}

impl VectorProgram for LottieProgram {
    fn frame_count(&self) -> u32 {
        self.doc.frame_count()
    }

    fn frame_rate(&self) -> f32 {
        self.doc.fr
    }

    fn render(&mut self, index: u32, out: &mut [u8], width: u32, height: u32) -> anyhow::Result<()> {
        let reuse = matches!(&self.pixmap, Some(p) if p.width() == width && p.height() == height);
        if !reuse {
            self.pixmap = Some(
                Pixmap::new(width, height)
                    .ok_or_else(|| anyhow::anyhow!("cannot allocate {width}x{height} canvas"))?,
            );
        }
        let Some(pixmap) = self.pixmap.as_mut() else {
            anyhow::bail!("canvas missing");
        };
        if out.len() != pixmap.data().len() {
            anyhow::bail!("output buffer is {} bytes, canvas is {}", out.len(), pixmap.data().len());
        }
        pixmap.fill(tiny_skia::Color::TRANSPARENT);

        let doc = &self.doc;
        let frame = doc.ip + index as f32;
        let canvas = Transform::from_scale(width as f32 / doc.w as f32, height as f32 / doc.h as f32);
        for layer in doc.layers.iter().rev() {
            draw_layer(pixmap, layer, frame, canvas);
        }

        for (px, dst) in pixmap.pixels().iter().zip(out.chunks_exact_mut(4)) {
            let c = px.demultiply();
            dst[0] = c.alpha();
            dst[1] = c.red();
            dst[2] = c.green();
            dst[3] = c.blue();
        }
        Ok(())
    }
}

/// [`VectorBackend`] that parses Lottie JSON and shares parsed documents
/// between programs opened with the same cache key.
#[derive(Default)]
pub struct LottieBackend {
    documents: Mutex<HashMap<String, Arc<LottieDocument>>>,
}

impl LottieBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parsed documents kept for reuse.
    pub fn cached_documents(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }
}

impl VectorBackend for LottieBackend {
    fn load(&self, data: &[u8], cache_key: &str) -> anyhow::Result<Box<dyn VectorProgram>> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| anyhow::anyhow!("lottie document cache poisoned"))?;
        let doc = match documents.get(cache_key) {
            Some(doc) => doc.clone(),
            None => {
                let doc = Arc::new(LottieDocument::parse(data)?);
                log::debug!(
                    "parsed lottie {cache_key}: {}x{} {} frames at {} fps",
                    doc.w,
                    doc.h,
                    doc.frame_count(),
                    doc.fr
                );
                documents.insert(cache_key.to_string(), doc.clone());
                doc
            }
        };
        Ok(Box::new(LottieProgram::new(doc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLID_RED: &str = r##"{
        "v": "5.5.2", "fr": 30, "ip": 0, "op": 10, "w": 100, "h": 100,
        "layers": [
            {"ty": 1, "ip": 0, "op": 10, "sc": "#ff0000", "sw": 100, "sh": 100, "ks": {}}
        ]
    }"##;

    /// A blue square sliding from the left half to the right half.
    const SLIDING_SQUARE: &str = r##"{
        "fr": 60, "ip": 0, "op": 2, "w": 4, "h": 2,
        "layers": [{
            "ty": 4, "ip": 0, "op": 2,
            "ks": {"p": {"a": 1, "k": [
                {"t": 0, "s": [1, 1]},
                {"t": 1, "s": [3, 1]}
            ]}},
            "shapes": [{"ty": "gr", "it": [
                {"ty": "rc", "p": {"k": [0, 0]}, "s": {"k": [2, 2]}, "r": {"k": 0}},
                {"ty": "st", "c": {"k": [0, 0, 0, 1]}},
                {"ty": "fl", "c": {"k": [0, 0, 1, 1]}, "o": {"k": 100}},
                {"ty": "tr", "p": {"k": [0, 0]}}
            ]}]
        }]
    }"##;

    fn render(json: &str, index: u32, w: u32, h: u32) -> Vec<u8> {
        let mut program = LottieBackend::new().load(json.as_bytes(), "test").unwrap();
        let mut out = vec![0u8; (w * h * 4) as usize];
        program.render(index, &mut out, w, h).unwrap();
        out
    }

    #[test]
    fn test_document_metadata() {
        let doc = LottieDocument::parse(SOLID_RED.as_bytes()).unwrap();
        assert_eq!(doc.frame_count(), 10);
        assert_eq!(doc.fr, 30.0);
        assert_eq!(doc.v.as_deref(), Some("5.5.2"));
    }

    #[test]
    fn test_solid_layer_fills_scaled_canvas_as_argb() {
        let out = render(SOLID_RED, 0, 8, 8);
        for px in out.chunks_exact(4) {
            assert_eq!(px, &[255, 255, 0, 0]);
        }
    }

    #[test]
    fn test_layer_outside_its_range_is_not_drawn() {
        let json = SOLID_RED.replace(r#""ip": 0, "op": 10, "sc""#, r#""ip": 5, "op": 10, "sc""#);
        assert!(render(&json, 0, 4, 4).iter().all(|b| *b == 0));
        assert_eq!(&render(&json, 5, 4, 4)[..4], &[255, 255, 0, 0]);
    }

    #[test]
    fn test_keyframed_position_moves_shape() {
        let first = render(SLIDING_SQUARE, 0, 4, 2);
        let second = render(SLIDING_SQUARE, 1, 4, 2);
        let pixel = |buf: &[u8], x: usize| buf[x * 4..x * 4 + 4].to_vec();
        assert_eq!(pixel(&first, 0), vec![255, 0, 0, 255]);
        assert_eq!(pixel(&first, 3), vec![0, 0, 0, 0]);
        assert_eq!(pixel(&second, 0), vec![0, 0, 0, 0]);
        assert_eq!(pixel(&second, 3), vec![255, 0, 0, 255]);
    }

    #[test]
    fn test_keyframe_interpolation_is_linear() {
        let keys: Vec<Keyframe> = serde_json::from_str(
            r#"[{"t": 0, "s": [0, 10]}, {"t": 10, "s": [100, 20]}, {"t": 20}]"#,
        )
        .unwrap();
        assert_eq!(sample_keyframes(&keys, 5.0), vec![50.0, 15.0]);
        assert_eq!(sample_keyframes(&keys, -1.0), vec![0.0, 10.0]);
        assert_eq!(sample_keyframes(&keys, 25.0), vec![100.0, 20.0]);
    }

    #[test]
    fn test_hex_colors() {
        assert_eq!(parse_hex_color("#204080"), Some([0x20, 0x40, 0x80]));
        assert_eq!(parse_hex_color("ffFF00"), Some([255, 255, 0]));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#zz0000"), None);
        // Six bytes, but not six hex digits.
        assert_eq!(parse_hex_color("#aééb"), None);
        assert_eq!(parse_hex_color("é12345"), None);
    }

    #[test]
    fn test_non_ascii_solid_color_skips_layer() {
        let json = SOLID_RED.replace("#ff0000", "#aééb");
        assert!(render(&json, 0, 4, 4).iter().all(|b| *b == 0));
    }

    #[test]
    fn test_documents_are_shared_by_cache_key() {
        let backend = LottieBackend::new();
        backend.load(SOLID_RED.as_bytes(), "a").unwrap();
        backend.load(SOLID_RED.as_bytes(), "a").unwrap();
        backend.load(SOLID_RED.as_bytes(), "b").unwrap();
        assert_eq!(backend.cached_documents(), 2);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(LottieBackend::new().load(b"{\"fr\": 30", "bad").is_err());
        let empty = r#"{"fr": 30, "ip": 0, "op": 0, "w": 10, "h": 10, "layers": []}"#;
        assert!(LottieBackend::new().load(empty.as_bytes(), "empty").is_err());
    }
}
