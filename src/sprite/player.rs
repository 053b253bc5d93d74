use crate::engine::{Point, Rect, Renderer};
use crate::sprite::{Direction, Mask, SpriteFrame, SpriteSheet};
use anyhow::Result;
use std::rc::Rc;
use web_sys::HtmlImageElement;

pub const GRAVITY: f32 = 1.0;

/// ELI5:
/// ┌───────────────── Pose Selection (first match wins) ─────────────────┐
/// │  hit          stunned by a hazard, overrides everything            │
/// │  jump         rising (y_vel < 0) on the first jump                 │
/// │  double_jump  rising on the second jump                            │
/// │  fall         dropping faster than 2x gravity                      │
/// │  run          nonzero horizontal velocity                          │
/// │  idle         default                                              │
/// └─────────────────────────────────────────────────────────────────────┘
/// The pose name plus the facing direction selects the animation clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pose {
    Hit,
    Jump,
    DoubleJump,
    Fall,
    Run,
    Idle,
}

impl Pose {
    fn clip_name(&self) -> &'static str {
        match self {
            Pose::Hit => "hit",
            Pose::Jump => "jump",
            Pose::DoubleJump => "double_jump",
            Pose::Fall => "fall",
            Pose::Run => "run",
            Pose::Idle => "idle",
        }
    }
}

/// The one kinematic body in the world. Physics and collision mutate the
/// velocities and counters; only `update_sprite` touches the displayed frame,
/// and it replaces bounding Rect and Mask as a single pair.
pub struct Player {
    rect: Rect,
    current: SpriteFrame,
    sheet: Rc<SpriteSheet>,
    x_vel: f32,
    y_vel: f32,
    direction: Direction,
    animation_count: u32,
    /// frames since last ground contact, drives the gravity ramp
    fall_count: u32,
    jump_count: u8,
    hit: bool,
    hit_count: u32,
}

impl Player {
    pub fn new(x: f32, y: f32, sheet: Rc<SpriteSheet>) -> Result<Self> {
        let current = sheet.frame("idle_left", 0)?.clone();
        Ok(Player {
            rect: Rect::new(Point { x, y }, current.size()),
            current,
            sheet,
            x_vel: 0.0,
            y_vel: 0.0,
            direction: Direction::Left,
            animation_count: 0,
            fall_count: 0,
            jump_count: 0,
            hit: false,
            hit_count: 0,
        })
    }

    /// Precondition enforced by the caller: jump_count < 2.
    pub fn jump(&mut self) {
        self.y_vel = -8.0 * GRAVITY;
        self.animation_count = 0;
        self.jump_count += 1;
        if self.jump_count == 1 {
            self.fall_count = 0;
        }
    }

    /// Pure translation, no collision awareness.
    pub fn move_by(&mut self, dx: f32, dy: f32) {
        self.rect.translate(dx, dy);
    }

    pub fn stop(&mut self) {
        self.x_vel = 0.0;
    }

    pub fn move_left(&mut self, vel: f32) {
        self.x_vel = -vel;
        // reset the clip only on a direction change, so continuous movement
        // does not restart the run animation every frame
        if self.direction != Direction::Left {
            self.direction = Direction::Left;
            self.animation_count = 0;
        }
    }

    pub fn move_right(&mut self, vel: f32) {
        self.x_vel = vel;
        if self.direction != Direction::Right {
            self.direction = Direction::Right;
            self.animation_count = 0;
        }
    }

    /// Vertical integration step. Gravity ramps up over roughly one second
    /// of falling, capped at one pixel-per-frame of added velocity.
    pub fn integrate(&mut self, fps: u32) {
        self.y_vel += 1f32.min(self.fall_count as f32 / fps as f32 * GRAVITY);
        self.move_by(self.x_vel, self.y_vel);

        if self.hit {
            self.hit_count += 1;
        }
        if self.hit_count > fps * 2 {
            self.hit = false;
        }

        self.fall_count += 1;
    }

    /// Called exactly once per downward collision detected by the vertical
    /// resolver.
    pub fn land(&mut self) {
        self.fall_count = 0;
        self.y_vel = 0.0;
        self.jump_count = 0;
    }

    /// Upward collision against terrain bounces the body back down.
    pub fn hit_ceiling(&mut self) {
        self.y_vel *= -1.0;
    }

    /// Start (or restart) the stun window.
    pub fn register_hit(&mut self) {
        self.hit = true;
        self.hit_count = 0;
    }

    pub fn snap_bottom_to(&mut self, y: f32) {
        self.rect.position.y = y - self.rect.height() as f32;
    }

    pub fn snap_top_to(&mut self, y: f32) {
        self.rect.position.y = y;
    }

    pub fn pose(&self) -> Pose {
        if self.hit {
            Pose::Hit
        } else if self.y_vel < 0.0 && self.jump_count == 1 {
            Pose::Jump
        } else if self.y_vel < 0.0 && self.jump_count == 2 {
            Pose::DoubleJump
        } else if self.y_vel > GRAVITY * 2.0 {
            Pose::Fall
        } else if self.x_vel != 0.0 {
            Pose::Run
        } else {
            Pose::Idle
        }
    }

    /// Animation step: pick the clip for the current pose and facing, then
    /// swap in the frame's Rect and Mask atomically (position preserved).
    /// Kinematic updates never touch the mask; this is the only place it
    /// changes.
    pub fn update_sprite(&mut self) -> Result<()> {
        let clip = format!("{}_{}", self.pose().clip_name(), self.direction.suffix());
        let frame = self.sheet.frame(&clip, self.animation_count)?.clone();
        self.animation_count += 1;
        self.rect = Rect::new(self.rect.position, frame.size());
        self.current = frame;
        Ok(())
    }

    pub fn draw(&self, renderer: &Renderer, image: &HtmlImageElement, offset_x: f32) {
        let destination = Rect::new(
            Point {
                x: self.rect.position.x - offset_x,
                y: self.rect.position.y,
            },
            self.current.size(),
        );
        if self.current.is_flipped() {
            renderer.draw_image_flipped(image, &self.current.source_rect(), &destination);
        } else {
            renderer.draw_image(image, &self.current.source_rect(), &destination);
        }

        #[cfg(debug_assertions)]
        {
            use crate::engine::DebugDraw;
            destination.draw_debug(renderer);
        }
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    pub fn mask(&self) -> &Mask {
        self.current.mask()
    }

    pub fn x_vel(&self) -> f32 {
        self.x_vel
    }

    pub fn y_vel(&self) -> f32 {
        self.y_vel
    }

    pub fn jump_count(&self) -> u8 {
        self.jump_count
    }

    pub fn is_hit(&self) -> bool {
        self.hit
    }

    #[cfg(test)]
    pub(crate) fn set_fall_count(&mut self, fall_count: u32) {
        self.fall_count = fall_count;
    }

    #[cfg(test)]
    pub(crate) fn set_y_vel(&mut self, y_vel: f32) {
        self.y_vel = y_vel;
    }
}
