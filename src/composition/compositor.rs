// src/composition/compositor.rs - per-frame zoom, pan and crossfade

use image::{Rgb, RgbImage};

use crate::composition::overlay::draw_timestamp_overlay;
use crate::composition::timeline::CompositionTimeline;
use crate::error::{CompositionError, Result};

/// Zoom gained over a scene (5 %)
pub const ZOOM_AMOUNT: f64 = 0.05;

/// Peak horizontal pan at the middle of a scene, in pixels
pub const PAN_PIXELS: f64 = 30.0;

/// Where an image lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Uniform scale from image to canvas pixels
    pub ratio: f64,
}

impl Placement {
    /// Centered fit of an `image_w × image_h` image, scaled by `zoom` and
    /// shifted right by `pan_x`
    pub fn fit(image_w: u32, image_h: u32, canvas_w: u32, canvas_h: u32, zoom: f64, pan_x: f64) -> Self {
        let (iw, ih) = (image_w as f64, image_h as f64);
        let (cw, ch) = (canvas_w as f64, canvas_h as f64);

        let ratio = (cw / iw).min(ch / ih) * zoom;
        let width = iw * ratio;
        let height = ih * ratio;

        Self {
            x: (cw - width) / 2.0 + pan_x,
            y: (ch - height) / 2.0,
            width,
            height,
            ratio,
        }
    }
}

/// One image drawn into a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    pub scene_index: usize,
    pub placement: Placement,
    pub opacity: f64,
}

/// Everything that determines a composite frame except the pixels themselves
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub frame_index: u64,
    pub scene_index: usize,
    pub frame_in_scene: u32,
    /// Position inside the scene, in `[0, 1)`
    pub progress: f64,
    pub zoom: f64,
    pub pan_x: f64,
    /// The current scene, zoomed and panned
    pub outgoing: Layer,
    /// The next scene while crossfading into it
    pub incoming: Option<Layer>,
}

impl FramePlan {
    pub fn outgoing_alpha(&self) -> f64 {
        self.outgoing.opacity
    }

    pub fn incoming_alpha(&self) -> f64 {
        self.incoming.map(|layer| layer.opacity).unwrap_or(0.0)
    }

    pub fn in_transition(&self) -> bool {
        self.incoming.is_some()
    }
}

/// Renders the composite frames of a timeline onto a fixed-size canvas.
///
/// Every frame is a pure function of its index, the scene images and the
/// canvas size.
pub struct Compositor<'t, 'a> {
    timeline: &'t CompositionTimeline<'a>,
    canvas_width: u32,
    canvas_height: u32,
}

impl<'t, 'a> Compositor<'t, 'a> {
    pub fn new(timeline: &'t CompositionTimeline<'a>, canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            timeline,
            canvas_width,
            canvas_height,
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.timeline.total_frames()
    }

    /// A black canvas of the output size
    pub fn new_canvas(&self) -> RgbImage {
        RgbImage::new(self.canvas_width, self.canvas_height)
    }

    /// Geometry and opacities of frame `frame_index`
    pub fn plan(&self, frame_index: u64) -> Result<FramePlan> {
        let total = self.total_frames();
        if frame_index >= total {
            return Err(CompositionError::FrameOutOfRange { index: frame_index, total }.into());
        }

        let timing = self.timeline.timing();
        let frames_per_scene = timing.frames_per_scene() as u64;
        let scene_index = (frame_index / frames_per_scene) as usize;
        let frame_in_scene = (frame_index % frames_per_scene) as u32;
        let progress = frame_in_scene as f64 / frames_per_scene as f64;

        let zoom = 1.0 + progress * ZOOM_AMOUNT;
        let pan_x = (progress * std::f64::consts::PI).sin() * PAN_PIXELS;

        let next_index = scene_index + 1;
        let crossfading = frame_in_scene >= timing.transition_start() && next_index < self.timeline.len();
        let alpha = if crossfading {
            1.0 - (frame_in_scene - timing.transition_start()) as f64 / timing.transition_frames as f64
        } else {
            1.0
        };

        let current = self.scene_size(scene_index)?;
        let outgoing = Layer {
            scene_index,
            placement: Placement::fit(current.0, current.1, self.canvas_width, self.canvas_height, zoom, pan_x),
            opacity: alpha,
        };

        let incoming = if crossfading {
            let next = self.scene_size(next_index)?;
            Some(Layer {
                scene_index: next_index,
                placement: Placement::fit(next.0, next.1, self.canvas_width, self.canvas_height, 1.0, 0.0),
                opacity: 1.0 - alpha,
            })
        } else {
            None
        };

        Ok(FramePlan {
            frame_index,
            scene_index,
            frame_in_scene,
            progress,
            zoom,
            pan_x,
            outgoing,
            incoming,
        })
    }

    /// Render frame `frame_index` into `canvas`, overwriting it
    pub fn render(&self, frame_index: u64, canvas: &mut RgbImage) -> Result<FramePlan> {
        let plan = self.plan(frame_index)?;

        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([0, 0, 0]);
        }

        for layer in std::iter::once(&plan.outgoing).chain(plan.incoming.as_ref()) {
            if let Some(scene) = self.timeline.scene(layer.scene_index) {
                draw_image(canvas, scene.image.as_image(), &layer.placement, layer.opacity);
            }
        }

        if let Some(scene) = self.timeline.scene(plan.scene_index) {
            draw_timestamp_overlay(canvas, &scene.timestamp);
        }

        Ok(plan)
    }

    fn scene_size(&self, index: usize) -> Result<(u32, u32)> {
        let scene = self.timeline.scene(index).ok_or(CompositionError::FrameOutOfRange {
            index: index as u64,
            total: self.timeline.len() as u64,
        })?;

        let (w, h) = (scene.image.width(), scene.image.height());
        if w == 0 || h == 0 {
            return Err(CompositionError::EmptyImage { index }.into());
        }
        Ok((w, h))
    }
}

/// Draw `image` scaled into `placement` with the given opacity (source-over)
fn draw_image(canvas: &mut RgbImage, image: &RgbImage, placement: &Placement, opacity: f64) {
    if opacity <= 0.0 || placement.width <= 0.0 || placement.height <= 0.0 {
        return;
    }
    let opacity = opacity.min(1.0);

    let (cw, ch) = (canvas.width() as f64, canvas.height() as f64);
    let x0 = placement.x.max(0.0).floor() as u32;
    let y0 = placement.y.max(0.0).floor() as u32;
    let x1 = (placement.x + placement.width).min(cw).ceil().max(0.0) as u32;
    let y1 = (placement.y + placement.height).min(ch).ceil().max(0.0) as u32;

    let scale_x = image.width() as f64 / placement.width;
    let scale_y = image.height() as f64 / placement.height;

    for py in y0..y1 {
        let cy = py as f64 + 0.5;
        if cy < placement.y || cy >= placement.y + placement.height {
            continue;
        }
        let sy = (cy - placement.y) * scale_y - 0.5;

        for px in x0..x1 {
            let cx = px as f64 + 0.5;
            if cx < placement.x || cx >= placement.x + placement.width {
                continue;
            }
            let sx = (cx - placement.x) * scale_x - 0.5;

            let src = sample_bilinear(image, sx, sy);
            let dst = canvas.get_pixel_mut(px, py);
            for c in 0..3 {
                let blended = dst[c] as f64 * (1.0 - opacity) + src[c] * opacity;
                dst[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> [f64; 3] {
    let max_x = (image.width() - 1) as f64;
    let max_y = (image.height() - 1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as u32, y0 as u32);
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut out = [0.0; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
    out
}
