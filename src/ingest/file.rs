//! Local file detection source.
//!
//! This module provides `FileSource` for replaying detections recorded by the
//! external detector. The file is JSON lines, one frame per line:
//!
//! ```text
//! [{"label": "Rexona Roll On", "confidence": 0.91, "box": [0.21, 0.48, 0.10, 0.22]}]
//! []
//! ```
//!
//! An empty array is a frame with no detections; blank lines are skipped; end
//! of file is end of stream.
//!
//! `stub://<name>` paths produce a deterministic synthetic sweep instead,
//! for demos and tests.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use crate::detect::{BoundingBox, Detection, DetectionSource, FrameDetections};

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path, or `stub://<name>` for the synthetic sweep.
    pub path: String,
    /// Frames produced by the synthetic sweep before end of stream (0 = endless).
    pub synthetic_frames: u64,
    /// Seed for the synthetic sweep.
    pub seed: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            synthetic_frames: 600,
            seed: 7,
        }
    }
}

/// Local file detection source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    JsonLines(JsonLinesSource),
    Synthetic(SyntheticSweepSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file source only supports local paths or stub:// (got '{}')",
                config.path
            ));
        }
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticSweepSource::new(config))
        } else {
            FileBackend::JsonLines(JsonLinesSource::new(config))
        };
        Ok(Self { backend })
    }

    /// Statistics for this source.
    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::JsonLines(source) => source.stats(),
            FileBackend::Synthetic(source) => source.stats(),
        }
    }
}

impl DetectionSource for FileSource {
    fn name(&self) -> &str {
        match &self.backend {
            FileBackend::JsonLines(_) => "file",
            FileBackend::Synthetic(_) => "synthetic",
        }
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::JsonLines(source) => source.connect(),
            FileBackend::Synthetic(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>> {
        match &mut self.backend {
            FileBackend::JsonLines(source) => source.next_frame(),
            FileBackend::Synthetic(source) => source.next_frame(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_read: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// JSON lines replay
// ----------------------------------------------------------------------------

struct JsonLinesSource {
    config: FileConfig,
    lines: Option<Lines<BufReader<File>>>,
    line_no: u64,
    frames_read: u64,
}

impl JsonLinesSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            lines: None,
            line_no: 0,
            frames_read: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        let file = File::open(&self.config.path)
            .with_context(|| format!("open detection file {}", self.config.path))?;
        self.lines = Some(BufReader::new(file).lines());
        log::info!("FileSource: replaying {}", self.config.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>> {
        if self.lines.is_none() {
            self.connect()?;
        }
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| anyhow!("detection file not open"))?;
        loop {
            let Some(line) = lines.next() else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line
                .with_context(|| format!("read {} line {}", self.config.path, self.line_no))?;
            if line.trim().is_empty() {
                continue;
            }
            let frame = parse_frame_line(&line)
                .with_context(|| format!("{} line {}", self.config.path, self.line_no))?;
            self.frames_read += 1;
            return Ok(Some(frame));
        }
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_read: self.frames_read,
            path: self.config.path.clone(),
        }
    }
}

/// Parse one JSON-lines frame record.
pub fn parse_frame_line(line: &str) -> Result<FrameDetections> {
    let detections: Vec<Detection> =
        serde_json::from_str(line).map_err(|e| anyhow!("invalid frame record: {}", e))?;
    let detections = detections
        .into_iter()
        .map(Detection::normalized)
        .collect::<Result<Vec<_>>>()?;
    Ok(FrameDetections::new(detections))
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for demos and tests
// ----------------------------------------------------------------------------

const SYNTHETIC_PRODUCTS: &[&str] = &[
    "Rexona Roll On",
    "Capri-Sun Safari Fruits",
    "Flormar HC28 Urban Escape",
    "Doğadan Sage 20s",
];
const SWEEP_FRAMES: u64 = 12;
const GAP_FRAMES: u64 = 14;

/// Items sweep left to right across the lane, separated by empty frames.
/// Each sweep carries its product label plus occasional low-confidence
/// confusions with a neighbouring product.
struct SyntheticSweepSource {
    config: FileConfig,
    rng: StdRng,
    frame_count: u64,
}

impl SyntheticSweepSource {
    fn new(config: FileConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("FileSource: connected to {} (synthetic)", self.config.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>> {
        if self.config.synthetic_frames > 0 && self.frame_count >= self.config.synthetic_frames {
            return Ok(None);
        }
        let idx = self.frame_count;
        self.frame_count += 1;

        let cycle = SWEEP_FRAMES + GAP_FRAMES;
        let phase = idx % cycle;
        if phase >= SWEEP_FRAMES {
            return Ok(Some(FrameDetections::empty()));
        }

        let sweep = (idx / cycle) as usize;
        let product = SYNTHETIC_PRODUCTS[sweep % SYNTHETIC_PRODUCTS.len()];
        let neighbour = SYNTHETIC_PRODUCTS[(sweep + 1) % SYNTHETIC_PRODUCTS.len()];

        let progress = phase as f32 / (SWEEP_FRAMES - 1) as f32;
        let x = 0.15 + 0.75 * progress;
        let y = 0.5 + self.rng.gen_range(-0.03..0.03);
        let (label, confidence) = if self.rng.gen_bool(0.2) {
            (neighbour, self.rng.gen_range(0.35..0.65))
        } else {
            (product, self.rng.gen_range(0.6..0.95))
        };
        let detection = Detection::new(label, confidence, BoundingBox::new(x, y, 0.12, 0.25))?;
        Ok(Some(FrameDetections::new(vec![detection])))
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_read: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
