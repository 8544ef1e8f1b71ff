//! Canvas geometry and the per-frame render plan.
//!
//! Stored positions live in original (uncropped) video pixels. The canvas
//! displays the possibly cropped raster scaled into a container, so every
//! pointer event is mapped back through offset, scale and crop origin before
//! it reaches the store.

use posemark_models::catalog::{keypoint, style, SKELETON_CONNECTIONS};
use posemark_models::{CropBounds, KeypointId, PersonId, Position, Rgb, ValidationError};
use serde::Serialize;
use tracing::debug;

use crate::state::AnnotationState;
use crate::store::AnnotationStore;

/// Opacity of persons other than the selected one.
pub const DIMMED_OPACITY: f64 = 0.4;

/// Scale applied to the marker of the selected keypoint.
pub const SELECTED_KEYPOINT_SCALE: f64 = 1.2;

/// Label offset from its marker, in display pixels.
const LABEL_OFFSET: (f64, f64) = (10.0, -10.0);

/// How a raster is scaled into its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Whole raster visible
    #[default]
    Fit,
    /// Container fully covered
    Fill,
}

/// Display scale for a `content` raster inside a `container`.
pub fn fit_scale(content: (f64, f64), container: (f64, f64), mode: FitMode) -> f64 {
    let (cw, ch) = content;
    let (bw, bh) = container;
    if !(cw > 0.0 && ch > 0.0 && bw > 0.0 && bh > 0.0) {
        return 1.0;
    }
    let (sx, sy) = (bw / cw, bh / ch);
    let scale = match mode {
        FitMode::Fit => sx.min(sy),
        FitMode::Fill => sx.max(sy),
    };
    if scale.is_finite() {
        scale
    } else {
        1.0
    }
}

/// Scale and centring offset of the raster on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl Viewport {
    /// Scale `content` into `container` and centre it.
    pub fn centered(content: (f64, f64), container: (f64, f64), mode: FitMode) -> Self {
        let scale = fit_scale(content, container, mode);
        Self {
            scale,
            offset_x: (container.0 - content.0 * scale) / 2.0,
            offset_y: (container.1 - content.1 * scale) / 2.0,
        }
    }
}

/// Everything needed to map between screen and stored coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    pub viewport: Viewport,
    pub crop: Option<CropBounds>,
    /// Original (uncropped) frame size
    pub original_width: u32,
    pub original_height: u32,
}

impl CanvasGeometry {
    /// Geometry for the loaded video, centred in `container`.
    pub fn for_state(state: &AnnotationState, container: (f64, f64), mode: FitMode) -> Option<Self> {
        let video = state.video.as_ref()?;
        let (original_width, original_height) = video.original_dimensions();
        let content = (f64::from(video.width), f64::from(video.height));
        Some(Self {
            viewport: Viewport::centered(content, container, mode),
            crop: state.crop,
            original_width,
            original_height,
        })
    }

    fn crop_origin(&self) -> (f64, f64) {
        self.crop
            .map(|c| (f64::from(c.x), f64::from(c.y)))
            .unwrap_or((0.0, 0.0))
    }

    /// Map a screen point to original video pixels. `None` when the point
    /// lands outside the original frame.
    pub fn screen_to_video(&self, sx: f64, sy: f64) -> Option<Position> {
        let Viewport {
            scale,
            offset_x,
            offset_y,
        } = self.viewport;
        if !(scale.is_finite() && scale > 0.0) {
            return None;
        }
        let (crop_x, crop_y) = self.crop_origin();
        let x = (sx - offset_x) / scale + crop_x;
        let y = (sy - offset_y) / scale + crop_y;

        let inside = (0.0..=f64::from(self.original_width)).contains(&x)
            && (0.0..=f64::from(self.original_height)).contains(&y);
        inside.then_some(Position::new(x, y))
    }

    /// Map a stored position to screen pixels.
    pub fn video_to_screen(&self, position: Position) -> (f64, f64) {
        let (crop_x, crop_y) = self.crop_origin();
        (
            (position.x - crop_x) * self.viewport.scale + self.viewport.offset_x,
            (position.y - crop_y) * self.viewport.scale + self.viewport.offset_y,
        )
    }
}

/// Result of a canvas click.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    Annotated {
        keypoint: KeypointId,
        next_keypoint: KeypointId,
        position: Position,
    },
    /// Outside the frame; nothing changed
    OutOfBounds,
    /// Inside the frame but the store refused it
    Rejected(ValidationError),
}

/// Annotate the selected keypoint at a screen point.
pub fn handle_click(store: &mut AnnotationStore, geometry: &CanvasGeometry, sx: f64, sy: f64) -> ClickOutcome {
    let Some(position) = geometry.screen_to_video(sx, sy) else {
        debug!(sx, sy, "Click outside the video frame ignored");
        return ClickOutcome::OutOfBounds;
    };
    match store.annotate_selected(position) {
        Ok((keypoint, next_keypoint)) => ClickOutcome::Annotated {
            keypoint,
            next_keypoint,
            position,
        },
        Err(e) => ClickOutcome::Rejected(e),
    }
}

/// Overlay switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub skeleton: bool,
    pub labels: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            skeleton: true,
            labels: true,
        }
    }
}

/// One drawing primitive, in screen pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DrawCommand {
    Line {
        person: PersonId,
        from: (f64, f64),
        to: (f64, f64),
        color: Rgb,
        width: f64,
        opacity: f64,
    },
    Marker {
        person: PersonId,
        keypoint: KeypointId,
        center: (f64, f64),
        radius: f64,
        fill: Rgb,
        stroke: Rgb,
        stroke_width: f64,
        opacity: f64,
    },
    Label {
        person: PersonId,
        at: (f64, f64),
        text: String,
        color: Rgb,
        opacity: f64,
    },
}

/// Draw commands for the current frame.
///
/// Other persons come first at reduced opacity; the selected person comes
/// last at full opacity with heavier strokes. Within a person, lines precede
/// markers and markers precede labels.
pub fn render_plan(state: &AnnotationState, geometry: &CanvasGeometry, options: RenderOptions) -> Vec<DrawCommand> {
    let Some(frame) = state.annotations.frame(state.current_frame) else {
        return Vec::new();
    };
    let selected = state.selection.person.as_ref();

    let mut order: Vec<&PersonId> = frame
        .keys()
        .filter(|id| state.persons.contains(id))
        .collect();
    order.sort_by_key(|id| Some(*id) == selected);

    let mut commands = Vec::new();
    for id in order {
        let (Some(person), Some(keypoints)) = (state.persons.get(id), frame.get(id)) else {
            continue;
        };
        let is_selected = Some(id) == selected;
        let opacity = if is_selected { 1.0 } else { DIMMED_OPACITY };
        let emphasis = if is_selected { 1.5 } else { 1.0 };

        if options.skeleton {
            for (a, b) in SKELETON_CONNECTIONS.iter() {
                if let (Some(pa), Some(pb)) = (keypoints.get(a), keypoints.get(b)) {
                    commands.push(DrawCommand::Line {
                        person: id.clone(),
                        from: geometry.video_to_screen(*pa),
                        to: geometry.video_to_screen(*pb),
                        color: style::SKELETON_COLOR,
                        width: style::SKELETON_LINE_WIDTH * emphasis,
                        opacity,
                    });
                }
            }
        }

        for (kp, position) in keypoints {
            let Some(entry) = keypoint(*kp) else { continue };
            let enlarged = is_selected && state.selection.keypoint == Some(*kp);
            commands.push(DrawCommand::Marker {
                person: id.clone(),
                keypoint: *kp,
                center: geometry.video_to_screen(*position),
                radius: if enlarged {
                    style::KEYPOINT_RADIUS * SELECTED_KEYPOINT_SCALE
                } else {
                    style::KEYPOINT_RADIUS
                },
                fill: entry.color,
                stroke: style::KEYPOINT_STROKE_COLOR,
                stroke_width: style::KEYPOINT_STROKE_WIDTH * emphasis,
                opacity,
            });
        }

        if options.labels {
            for (kp, position) in keypoints {
                let Some(entry) = keypoint(*kp) else { continue };
                let (x, y) = geometry.video_to_screen(*position);
                commands.push(DrawCommand::Label {
                    person: id.clone(),
                    at: (x + LABEL_OFFSET.0, y + LABEL_OFFSET.1),
                    text: entry.name.to_string(),
                    color: person.color,
                    opacity,
                });
            }
        }
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NamePolicy;
    use posemark_models::VideoInfo;

    fn geometry(scale: f64, offset: (f64, f64), crop: Option<CropBounds>) -> CanvasGeometry {
        CanvasGeometry {
            viewport: Viewport {
                scale,
                offset_x: offset.0,
                offset_y: offset.1,
            },
            crop,
            original_width: 1920,
            original_height: 1080,
        }
    }

    #[test]
    fn test_fit_scale() {
        assert_eq!(fit_scale((1920.0, 1080.0), (960.0, 960.0), FitMode::Fit), 0.5);
        assert_eq!(fit_scale((1920.0, 1080.0), (960.0, 1080.0), FitMode::Fill), 1.0);
        assert_eq!(fit_scale((0.0, 1080.0), (960.0, 960.0), FitMode::Fit), 1.0);
    }

    #[test]
    fn test_centered_viewport() {
        let vp = Viewport::centered((1920.0, 1080.0), (960.0, 960.0), FitMode::Fit);
        assert_eq!(vp.scale, 0.5);
        assert_eq!(vp.offset_x, 0.0);
        assert_eq!(vp.offset_y, 210.0);
    }

    #[test]
    fn test_screen_to_video_with_crop() {
        let g = geometry(0.5, (0.0, 10.0), Some(CropBounds::new(0, 140, 1920, 800)));
        let pos = g.screen_to_video(100.0, 60.0).unwrap();
        assert_eq!(pos, Position::new(200.0, 240.0));
        assert_eq!(g.video_to_screen(pos), (100.0, 60.0));
    }

    #[test]
    fn test_screen_to_video_rejects_outside() {
        let g = geometry(1.0, (0.0, 0.0), None);
        assert!(g.screen_to_video(-1.0, 5.0).is_none());
        assert!(g.screen_to_video(5.0, 1081.0).is_none());
        assert!(g.screen_to_video(1920.0, 1080.0).is_some());
    }

    #[test]
    fn test_out_of_bounds_click_leaves_store_unchanged() {
        let mut store = AnnotationStore::new();
        store.load_video(VideoInfo::new(1920, 1080, 10.0, 30.0));
        store.create_person("Alice", NamePolicy::AutoSuffix).unwrap();
        let before = store.snapshot();

        let outcome = handle_click(&mut store, &geometry(1.0, (0.0, 0.0), None), 5000.0, 10.0);
        assert_eq!(outcome, ClickOutcome::OutOfBounds);
        assert!(std::sync::Arc::ptr_eq(&before, &store.snapshot()));

        let outcome = handle_click(&mut store, &geometry(1.0, (0.0, 0.0), None), 10.0, 10.0);
        assert!(matches!(outcome, ClickOutcome::Annotated { keypoint: 0, next_keypoint: 1, .. }));
    }

    #[test]
    fn test_render_plan_order_and_emphasis() {
        let mut store = AnnotationStore::new();
        store.load_video(VideoInfo::new(1920, 1080, 10.0, 30.0));
        let alice = store.create_person("Alice", NamePolicy::AutoSuffix).unwrap();
        let bob = store.create_person("Bob", NamePolicy::AutoSuffix).unwrap();
        for person in [&alice.id, &bob.id] {
            store.add_annotation(0, person, 0, Position::new(10.0, 10.0)).unwrap();
            store.add_annotation(0, person, 1, Position::new(20.0, 20.0)).unwrap();
        }
        store.select_person_and_switch_tab(&alice.id).unwrap();

        let state = store.snapshot();
        let plan = render_plan(&state, &geometry(1.0, (0.0, 0.0), None), RenderOptions::default());

        // Bob (dimmed) is drawn before Alice (selected)
        let people: Vec<&PersonId> = plan
            .iter()
            .map(|c| match c {
                DrawCommand::Line { person, .. }
                | DrawCommand::Marker { person, .. }
                | DrawCommand::Label { person, .. } => person,
            })
            .collect();
        let first_alice = people.iter().position(|p| **p == alice.id).unwrap();
        assert!(people[..first_alice].iter().all(|p| **p == bob.id));

        let alice_cmds = &plan[first_alice..];
        assert!(matches!(alice_cmds[0], DrawCommand::Line { opacity, width, .. } if opacity == 1.0 && width == 3.0));
        assert!(matches!(alice_cmds[1], DrawCommand::Marker { keypoint: 0, radius, .. } if radius == 6.0 * 1.2));
        assert!(matches!(alice_cmds[2], DrawCommand::Marker { keypoint: 1, radius, .. } if radius == 6.0));
        assert!(matches!(alice_cmds[3], DrawCommand::Label { at, .. } if at == (20.0, 0.0)));

        assert!(matches!(plan[0], DrawCommand::Line { opacity, .. } if opacity == DIMMED_OPACITY));
    }

    #[test]
    fn test_render_plan_empty_frame() {
        let state = AnnotationState::for_video(VideoInfo::new(640, 480, 1.0, 30.0));
        let g = CanvasGeometry::for_state(&state, (640.0, 480.0), FitMode::Fit).unwrap();
        assert!(render_plan(&state, &g, RenderOptions::default()).is_empty());
    }
}
