//! The closed set of background task kinds.
//!
//! Every task is a pure function from payload to output. Failures inside a
//! task never propagate: they come back as an empty output so that one bad
//! tile cannot stall a worker.

use crate::{
    core::{
        geo::TileCoord,
        grid::{quadkey, TileRange},
    },
    prelude::Arc,
    rendering::Bitmap,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Payload of the URL synthesis task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRequest {
    /// Wrapped tile coordinate
    pub coords: TileCoord,
    pub template: String,
    pub subdomains: Vec<String>,
    pub max_zoom: f64,
    pub zoom_reverse: bool,
    pub zoom_offset: i32,
    pub tms: bool,
    pub retina: bool,
    pub infinite: bool,
    pub global_tile_range: Option<TileRange>,
    pub params: BTreeMap<String, String>,
}

/// Payload of the decode/composite task
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub data: Arc<Vec<u8>>,
    pub tile_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerTask {
    ComputeUrl(UrlRequest),
    RenderTile(RenderRequest),
}

/// Result of a render task
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    Bitmap(Bitmap),
    /// Background compositing is unavailable; the caller decodes these bytes
    Fallback(Arc<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// `None` when the URL could not be built
    Url(Option<String>),
    /// `None` when decoding failed
    Render(Option<RenderOutput>),
}

impl WorkerTask {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerTask::ComputeUrl(_) => "compute-url",
            WorkerTask::RenderTile(_) => "render-tile",
        }
    }

    /// Output reported when the task could not run to completion
    pub fn empty_output(&self) -> TaskOutput {
        match self {
            WorkerTask::ComputeUrl(_) => TaskOutput::Url(None),
            WorkerTask::RenderTile(_) => TaskOutput::Render(None),
        }
    }

    pub fn execute(&self) -> TaskOutput {
        match self {
            WorkerTask::ComputeUrl(request) => TaskOutput::Url(compute_url(request)),
            WorkerTask::RenderTile(request) => TaskOutput::Render(render_tile(request)),
        }
    }
}

/// Builds the request URL of a tile from its template.
///
/// Tokens: `{s}` subdomain, `{x}`, `{y}`, `{z}` (after reverse/offset),
/// `{-y}` and TMS inversion on finite grids, `{r}` retina suffix, `{q}`
/// quadkey, then any extra `params`. Unknown tokens become empty. Returns
/// `None` for an unterminated `{` or a `{s}` with no subdomains.
pub fn compute_url(request: &UrlRequest) -> Option<String> {
    let coords = request.coords;

    let mut z = coords.z;
    if request.zoom_reverse {
        z = request.max_zoom.round() as i32 - z;
    }
    let zoom = z + request.zoom_offset;

    let mut y = coords.y as i64;
    let mut inverted_y = None;
    if !request.infinite {
        let max_y = request.global_tile_range.map_or(0, |range| range.max_y) as i64;
        let inverted = max_y - coords.y as i64;
        if request.tms {
            y = inverted;
        }
        inverted_y = Some(inverted);
    }

    let subdomain = || -> Option<String> {
        if request.subdomains.is_empty() {
            return None;
        }
        let index = (coords.x as i64 + coords.y as i64).unsigned_abs() as usize
            % request.subdomains.len();
        Some(request.subdomains[index].clone())
    };

    template(&request.template, |key| match key {
        "s" => subdomain().map(Some),
        "x" => Some(Some(coords.x.to_string())),
        "y" => Some(Some(y.to_string())),
        "z" => Some(Some(zoom.to_string())),
        "-y" => Some(inverted_y.map(|v| v.to_string())),
        "r" => Some(Some(if request.retina { "@2x" } else { "" }.to_string())),
        "q" => Some(Some(quadkey(coords))),
        other => Some(request.params.get(other).cloned()),
    })
}

/// Replaces `{ key }` placeholders. The lookup returns `None` when the
/// template cannot be filled at all, `Some(None)` for an unknown key.
fn template<F>(source: &str, mut lookup: F) -> Option<String>
where
    F: FnMut(&str) -> Option<Option<String>>,
{
    let mut out = String::with_capacity(source.len() + 16);
    let mut rest = source;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}')?;
        let inner = &after[..close];
        if inner.contains('{') {
            out.push('{');
            rest = after;
            continue;
        }
        let key = inner.trim_matches(' ');
        let is_token = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if is_token {
            out.push_str(&lookup(key)?.unwrap_or_default());
        } else {
            out.push('{');
            out.push_str(inner);
            out.push('}');
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Decodes an encoded tile and recomposites it into a `tile_size` square.
/// Without the `render` feature the bytes come back untouched as a fallback.
pub fn render_tile(request: &RenderRequest) -> Option<RenderOutput> {
    #[cfg(feature = "render")]
    {
        match crate::rendering::decode_and_composite(&request.data, request.tile_size) {
            Ok(bitmap) => Some(RenderOutput::Bitmap(bitmap)),
            Err(e) => {
                log::warn!("render task failed, reporting an empty result: {}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "render"))]
    {
        Some(RenderOutput::Fallback(request.data.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(template: &str, x: i32, y: i32, z: i32) -> UrlRequest {
        UrlRequest {
            coords: TileCoord::new(x, y, z),
            template: template.to_string(),
            subdomains: vec!["a".into(), "b".into(), "c".into()],
            max_zoom: 18.0,
            zoom_reverse: false,
            zoom_offset: 0,
            tms: false,
            retina: false,
            infinite: false,
            global_tile_range: Some(TileRange::new(0, 0, 7, 7)),
            params: BTreeMap::new(),
        }
    }

    #[test]
    fn test_standard_template() {
        let req = request("https://{s}.tile.example.org/{z}/{x}/{y}{r}.png", 3, 2, 3);
        assert_eq!(
            compute_url(&req).unwrap(),
            "https://c.tile.example.org/3/3/2.png"
        );
    }

    #[test]
    fn test_tms_and_inverted_y() {
        let mut req = request("{z}/{x}/{y}|{-y}", 1, 2, 3);
        assert_eq!(compute_url(&req).unwrap(), "3/1/2|5");
        req.tms = true;
        assert_eq!(compute_url(&req).unwrap(), "3/1/5|5");
    }

    #[test]
    fn test_infinite_grid_has_no_inverted_y() {
        let mut req = request("{y}:{-y}", 1, 2, 3);
        req.infinite = true;
        req.tms = true;
        assert_eq!(compute_url(&req).unwrap(), "2:");
    }

    #[test]
    fn test_zoom_reverse_and_offset() {
        let mut req = request("{z}", 0, 0, 5);
        req.zoom_reverse = true;
        req.zoom_offset = 1;
        assert_eq!(compute_url(&req).unwrap(), "14");
    }

    #[test]
    fn test_subdomain_uses_absolute_sum() {
        let req = request("{s}", -4, 0, 3);
        assert_eq!(compute_url(&req).unwrap(), "b");
    }

    #[test]
    fn test_params_quadkey_and_spacing() {
        let mut req = request("{ q }?key={apiKey}&u={unknown}&r={r}", 3, 5, 3);
        req.params.insert("apiKey".into(), "k1".into());
        req.retina = true;
        assert_eq!(compute_url(&req).unwrap(), "213?key=k1&u=&r=@2x");
    }

    #[test]
    fn test_malformed_templates_yield_no_url() {
        assert_eq!(
            compute_url(&request("https://x/{z/{x}", 0, 0, 0)).unwrap(),
            "https://x/{z/0"
        );
        assert!(compute_url(&request("https://x/{z", 0, 0, 0)).is_none());
        let mut req = request("{s}/{z}", 0, 0, 0);
        req.subdomains.clear();
        assert!(compute_url(&req).is_none());
    }

    #[test]
    fn test_non_token_braces_are_kept() {
        let req = request("a{b c}d{x}", 4, 0, 3);
        assert_eq!(compute_url(&req).unwrap(), "a{b c}d4");
    }

    #[cfg(feature = "render")]
    #[test]
    fn test_render_swallows_decode_failure() {
        let task = WorkerTask::RenderTile(RenderRequest {
            data: Arc::new(b"broken".to_vec()),
            tile_size: 256,
        });
        assert_eq!(task.execute(), TaskOutput::Render(None));
    }

    #[cfg(feature = "render")]
    #[test]
    fn test_render_composites_to_square() {
        let png = crate::rendering::bitmap::encode_png(4, 2, [0, 0, 255, 255]);
        let out = render_tile(&RenderRequest {
            data: Arc::new(png),
            tile_size: 16,
        });
        match out {
            Some(RenderOutput::Bitmap(bitmap)) => assert_eq!((bitmap.width, bitmap.height), (16, 16)),
            other => panic!("unexpected output {:?}", other),
        }
    }
}
