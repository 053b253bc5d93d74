use crate::engine::{Point, Rect, Renderer};
use crate::sprite::{Mask, SheetRect, SpriteFrame, SpriteSheet, ANIMATION_DELAY};
use anyhow::Result;
use std::rc::Rc;
use web_sys::HtmlImageElement;

/// Pixel column of the square tile inside Terrain.png.
const TERRAIN_TILE_X: i16 = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Kinematic drive of a moving platform: cycles around its origin,
/// flipping direction once it strays past `range`. The position is not
/// clamped at the boundary, so a platform overshoots by at most one `speed`
/// step before turning - deterministic at a fixed tick rate.
struct Drive {
    axis: Axis,
    range: f32,
    speed: f32,
    origin: f32,
    direction: f32,
}

struct FireTrap {
    sheet: Rc<SpriteSheet>,
    lit: bool,
    animation_count: u32,
}

/// The only behavior that differs between terrain categories is a single
/// hazard bit plus who mutates them per tick, so a tagged variant beats a
/// type hierarchy here.
enum ObstacleKind {
    Block,
    Platform(Drive),
    Fire(FireTrap),
}

/// A collidable terrain object: bounding rect plus the sprite frame (and
/// mask) currently displayed.
pub struct Obstacle {
    rect: Rect,
    frame: SpriteFrame,
    kind: ObstacleKind,
}

impl Obstacle {
    /// Immovable square tile. Its position is fixed at placement.
    pub fn block(x: f32, y: f32, size: i16) -> Self {
        Obstacle {
            rect: Rect::new_at(x, y, size, size),
            frame: terrain_frame(size),
            kind: ObstacleKind::Block,
        }
    }

    pub fn platform(x: f32, y: f32, size: i16, axis: Axis, range: f32, speed: f32) -> Self {
        let origin = match axis {
            Axis::Horizontal => x,
            Axis::Vertical => y,
        };
        Obstacle {
            rect: Rect::new_at(x, y, size, size),
            frame: terrain_frame(size),
            kind: ObstacleKind::Platform(Drive {
                axis,
                range,
                speed,
                origin,
                direction: 1.0,
            }),
        }
    }

    /// Fire trap, initially unlit. Its rect and mask track whichever clip
    /// ("on"/"off") currently drives it.
    pub fn fire(x: f32, y: f32, sheet: Rc<SpriteSheet>) -> Result<Self> {
        let frame = sheet.frame("off", 0)?.clone();
        Ok(Obstacle {
            rect: Rect::new(Point { x, y }, frame.size()),
            frame,
            kind: ObstacleKind::Fire(FireTrap {
                sheet,
                lit: false,
                animation_count: 0,
            }),
        })
    }

    pub fn is_hazard(&self) -> bool {
        matches!(self.kind, ObstacleKind::Fire(_))
    }

    pub fn set_lit(&mut self, lit: bool) {
        if let ObstacleKind::Fire(trap) = &mut self.kind {
            trap.lit = lit;
        }
    }

    /// Platform drive, applied unconditionally once per tick regardless of
    /// collision outcomes. No-op for other terrain.
    pub fn advance(&mut self) {
        let ObstacleKind::Platform(drive) = &mut self.kind else {
            return;
        };
        match drive.axis {
            Axis::Horizontal => {
                self.rect.position.x += drive.speed * drive.direction;
                if (self.rect.position.x - drive.origin).abs() > drive.range {
                    drive.direction *= -1.0;
                }
            }
            Axis::Vertical => {
                self.rect.position.y += drive.speed * drive.direction;
                if (self.rect.position.y - drive.origin).abs() > drive.range {
                    drive.direction *= -1.0;
                }
            }
        }
    }

    /// Fire clip cycling. Swaps rect and mask as one pair, like the player's
    /// animation step. No-op for terrain without an animation.
    pub fn animate(&mut self) -> Result<()> {
        let ObstacleKind::Fire(trap) = &mut self.kind else {
            return Ok(());
        };
        let clip_name = if trap.lit { "on" } else { "off" };
        let clip_len = trap.sheet.clip(clip_name)?.len() as u32;
        let frame = trap.sheet.frame(clip_name, trap.animation_count)?.clone();
        trap.animation_count += 1;
        if trap.animation_count / ANIMATION_DELAY > clip_len {
            trap.animation_count = 0;
        }
        self.rect = Rect::new(self.rect.position, frame.size());
        self.frame = frame;
        Ok(())
    }

    pub fn collides_with(&self, other: &Rect, other_mask: &Mask) -> bool {
        self.frame
            .mask()
            .overlaps(self.rect.pixel_origin(), other_mask, other.pixel_origin())
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    pub fn draw(&self, renderer: &Renderer, image: &HtmlImageElement, offset_x: f32) {
        let destination = Rect::new(
            Point {
                x: self.rect.position.x - offset_x,
                y: self.rect.position.y,
            },
            self.frame.size(),
        );
        renderer.draw_image(image, &self.frame.source_rect(), &destination);
    }

    #[cfg(test)]
    pub(crate) fn animation_count(&self) -> u32 {
        match &self.kind {
            ObstacleKind::Fire(trap) => trap.animation_count,
            _ => 0,
        }
    }
}

fn terrain_frame(size: i16) -> SpriteFrame {
    SpriteFrame::new(
        SheetRect {
            x: TERRAIN_TILE_X,
            y: 0,
            w: size,
            h: size,
        },
        Rc::new(Mask::solid(size, size)),
    )
}

/// Collectible. Deliberately has no mask: collection and spawn placement
/// both use coarse rectangle overlap, a cheaper and more forgiving test
/// than terrain collision. Coins are not blocked by terrain.
pub struct Coin {
    pub rect: Rect,
}

impl Coin {
    pub const SIZE: i16 = 23;

    pub fn new(x: f32, y: f32) -> Self {
        Coin {
            rect: Rect::new_at(x, y, Self::SIZE, Self::SIZE),
        }
    }

    pub fn draw(&self, renderer: &Renderer, image: &HtmlImageElement, offset_x: f32) {
        renderer.draw_entire_image(
            image,
            &Point {
                x: self.rect.position.x - offset_x,
                y: self.rect.position.y,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::fixtures;
    use std::collections::HashMap;

    #[test]
    fn platform_cycles_around_its_origin() {
        let mut platform = Obstacle::platform(300.0, 500.0, 96, Axis::Horizontal, 150.0, 3.0);

        let mut max_offset: f32 = 0.0;
        let mut returned = false;
        for step in 0..400 {
            platform.advance();
            let offset = platform.rect().position.x - 300.0;
            max_offset = max_offset.max(offset.abs());
            if step > 0 && offset.abs() <= 3.0 {
                returned = true;
            }
        }
        // overshoots by at most one speed step past the range, then turns
        assert_eq!(max_offset, 153.0);
        assert!(returned, "platform never came back near its origin");
    }

    #[test]
    fn vertical_platform_moves_on_the_y_axis_only() {
        let mut platform = Obstacle::platform(700.0, 320.0, 96, Axis::Vertical, 100.0, 2.0);
        platform.advance();
        assert_eq!(platform.rect().position.x, 700.0);
        assert_eq!(platform.rect().position.y, 322.0);
    }

    #[test]
    fn blocks_never_move() {
        let mut block = Obstacle::block(0.0, 600.0, 96);
        block.advance();
        block.animate().unwrap();
        assert_eq!(block.rect().position, Point { x: 0.0, y: 600.0 });
    }

    #[test]
    fn toggling_fire_changes_which_clip_drives_the_mask() {
        // unlit frames are fully transparent, lit frames fully opaque
        let mut clips = HashMap::new();
        clips.insert(
            "off".to_string(),
            vec![SpriteFrame::new(
                SheetRect {
                    x: 0,
                    y: 0,
                    w: 16,
                    h: 32,
                },
                Rc::new(Mask::from_alpha(16, 32, &[0; 16 * 32])),
            )],
        );
        clips.insert("on".to_string(), vec![fixtures::solid_frame(16, 32); 3]);
        let mut fire = Obstacle::fire(100.0, 600.0, Rc::new(SpriteSheet::new(clips))).unwrap();
        assert!(fire.is_hazard());

        let probe_rect = Rect::new_at(100.0, 600.0, 16, 32);
        let probe_mask = Mask::solid(16, 32);
        assert!(!fire.collides_with(&probe_rect, &probe_mask));

        fire.set_lit(true);
        fire.animate().unwrap();
        assert!(fire.collides_with(&probe_rect, &probe_mask));
    }

    #[test]
    fn fire_animation_counter_wraps_past_the_clip_end() {
        let mut fire = Obstacle::fire(100.0, 600.0, fixtures::fire_sheet()).unwrap();
        fire.set_lit(true);

        // "on" has 3 frames at ANIMATION_DELAY ticks each; drive it well past
        // one full cycle and the counter must have wrapped back down
        for _ in 0..ANIMATION_DELAY * 4 {
            fire.animate().unwrap();
        }
        assert!(fire.animation_count() < ANIMATION_DELAY * 4);
    }
}
