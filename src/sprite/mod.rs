// TABLE:
// ┌──────────────────────────────────────────────────────────────────────────┐
// │                      Sprite Pipeline Overview                            │
// ├────────────────┬─────────────────────────────────────────────────────────┤
// │   Stage        │   What it produces                                      │
// ├────────────────┼─────────────────────────────────────────────────────────┤
// │ fetch_json     │ Sheet : frame key -> source rect on the sheet image     │
// │ read_alpha     │ AlphaMap : per-pixel opacity of the whole sheet image   │
// │ from_sheet     │ SpriteSheet : clip name -> ordered SpriteFrames, each   │
// │                │ carrying its source rect and collision Mask             │
// │ frame()        │ The frame a given animation counter lands on            │
// └────────────────┴─────────────────────────────────────────────────────────┘
// Frame keys follow the packed-sheet convention "<clip> (<n>).png" with a
// 1-based frame number. Direction-aware sheets store right-facing art only;
// the left clips are produced here by mirroring frame and mask.
use crate::engine::{Rect, Size};
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

pub mod player;

/// Every displayed frame persists for this many ticks - a fixed-rate
/// flipbook, not time-based interpolation.
pub const ANIMATION_DELAY: u32 = 3;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Sheet {
    pub frames: HashMap<String, Cell>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Cell {
    pub frame: SheetRect,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct SheetRect {
    pub x: i16,
    pub y: i16,
    pub w: i16,
    pub h: i16,
}

/// Facing of the player, part of the clip name ("run_left", "run_right").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn suffix(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

/// Opacity of a whole sheet image, one byte per pixel.
pub struct AlphaMap {
    width: i16,
    height: i16,
    alpha: Vec<u8>,
}

impl AlphaMap {
    pub fn from_rgba(width: i16, height: i16, rgba: &[u8]) -> Self {
        let alpha = rgba.chunks(4).map(|px| px[3]).collect();
        AlphaMap {
            width,
            height,
            alpha,
        }
    }

    fn alpha_at(&self, x: i16, y: i16) -> u8 {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return 0;
        }
        self.alpha[y as usize * self.width as usize + x as usize]
    }
}

/// Per-pixel opacity bitmap used for precise overlap testing. Dimensions
/// always equal the bounding Rect of whatever sprite it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: i16,
    height: i16,
    bits: Vec<bool>,
}

impl Mask {
    /// A pixel is collidable when its alpha is past the half-way point.
    const OPAQUE: u8 = 127;

    pub fn from_alpha(width: i16, height: i16, alpha: &[u8]) -> Self {
        let bits = alpha.iter().map(|a| *a > Self::OPAQUE).collect();
        Mask {
            width,
            height,
            bits,
        }
    }

    /// Slice a frame-sized mask out of a sheet's alpha map.
    pub fn from_region(map: &AlphaMap, region: &SheetRect) -> Self {
        let mut alpha = Vec::with_capacity(region.w as usize * region.h as usize);
        for y in region.y..region.y + region.h {
            for x in region.x..region.x + region.w {
                alpha.push(map.alpha_at(x, y));
            }
        }
        Mask::from_alpha(region.w, region.h, &alpha)
    }

    /// Fully opaque mask, used for square terrain tiles.
    pub fn solid(width: i16, height: i16) -> Self {
        Mask {
            width,
            height,
            bits: vec![true; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> i16 {
        self.width
    }

    pub fn height(&self) -> i16 {
        self.height
    }

    fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }

    /// Mirror around the vertical axis, for left-facing clips.
    pub fn flipped(&self) -> Mask {
        let mut bits = Vec::with_capacity(self.bits.len());
        for row in self.bits.chunks(self.width as usize) {
            bits.extend(row.iter().rev().copied());
        }
        Mask {
            width: self.width,
            height: self.height,
            bits,
        }
    }

    /// Mask-accurate overlap: both masks are placed at their pixel origins
    /// and a collision exists iff at least one pixel in the shared region is
    /// opaque in both. A zero-area overlap is never a collision.
    pub fn overlaps(&self, origin: (i32, i32), other: &Mask, other_origin: (i32, i32)) -> bool {
        let left = origin.0.max(other_origin.0);
        let right = (origin.0 + self.width as i32).min(other_origin.0 + other.width as i32);
        let top = origin.1.max(other_origin.1);
        let bottom = (origin.1 + self.height as i32).min(other_origin.1 + other.height as i32);
        if right <= left || bottom <= top {
            return false;
        }
        for y in top..bottom {
            for x in left..right {
                if self.get(x - origin.0, y - origin.1)
                    && other.get(x - other_origin.0, y - other_origin.1)
                {
                    return true;
                }
            }
        }
        false
    }
}

/// One displayable frame: where it sits on the sheet image, whether the
/// renderer mirrors it, and the collision mask matching its pixels.
#[derive(Clone)]
pub struct SpriteFrame {
    source: SheetRect,
    flip: bool,
    mask: Rc<Mask>,
}

impl SpriteFrame {
    pub fn new(source: SheetRect, mask: Rc<Mask>) -> Self {
        SpriteFrame {
            source,
            flip: false,
            mask,
        }
    }

    fn flipped(&self) -> Self {
        SpriteFrame {
            source: self.source,
            flip: !self.flip,
            mask: Rc::new(self.mask.flipped()),
        }
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.source.w,
            height: self.source.h,
        }
    }

    pub fn source_rect(&self) -> Rect {
        Rect::new_at(
            self.source.x as f32,
            self.source.y as f32,
            self.source.w,
            self.source.h,
        )
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn is_flipped(&self) -> bool {
        self.flip
    }
}

/// Clip name -> ordered frames. This is the asset repository the animation
/// step indexes into; a missing clip is a configuration error with no
/// fallback.
pub struct SpriteSheet {
    clips: HashMap<String, Vec<SpriteFrame>>,
}

impl SpriteSheet {
    pub(crate) fn new(clips: HashMap<String, Vec<SpriteFrame>>) -> Self {
        SpriteSheet { clips }
    }

    /// Build clips from the fetched sheet description plus the image's alpha
    /// channel. With `directional` set, every clip `name` becomes a
    /// `name_right` clip plus a mirrored `name_left` clip.
    pub fn from_sheet(sheet: &Sheet, alpha: &AlphaMap, directional: bool) -> Result<Self> {
        let mut ordered: HashMap<String, BTreeMap<u32, SpriteFrame>> = HashMap::new();
        for (key, cell) in &sheet.frames {
            let (name, index) = parse_frame_key(key)
                .ok_or_else(|| anyhow!("unrecognized frame key '{}' in sheet", key))?;
            let mask = Rc::new(Mask::from_region(alpha, &cell.frame));
            ordered
                .entry(name.to_string())
                .or_default()
                .insert(index, SpriteFrame::new(cell.frame, mask));
        }

        let mut clips = HashMap::new();
        for (name, frames) in ordered {
            let frames: Vec<SpriteFrame> = frames.into_values().collect();
            if directional {
                clips.insert(
                    format!("{}_left", name),
                    frames.iter().map(SpriteFrame::flipped).collect(),
                );
                clips.insert(format!("{}_right", name), frames);
            } else {
                clips.insert(name, frames);
            }
        }
        if clips.is_empty() {
            bail!("sheet holds no frames");
        }
        Ok(SpriteSheet::new(clips))
    }

    pub fn clip(&self, name: &str) -> Result<&[SpriteFrame]> {
        self.clips
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("no animation clip named '{}'", name))
    }

    /// The frame a given animation counter lands on: each frame is shown for
    /// ANIMATION_DELAY consecutive ticks, wrapping over the clip length.
    pub fn frame(&self, name: &str, animation_count: u32) -> Result<&SpriteFrame> {
        let clip = self.clip(name)?;
        let index = (animation_count / ANIMATION_DELAY) as usize % clip.len();
        Ok(&clip[index])
    }
}

/// "<clip> (<n>).png" -> (clip, n)
fn parse_frame_key(key: &str) -> Option<(&str, u32)> {
    let key = key.strip_suffix(".png").unwrap_or(key);
    let open = key.rfind(" (")?;
    let index = key[open + 2..].strip_suffix(')')?.parse().ok()?;
    Some((&key[..open], index))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: i16, height: i16) -> Mask {
        let alpha: Vec<u8> = (0..width as usize * height as usize)
            .map(|i| if i % 2 == 0 { 255 } else { 0 })
            .collect();
        Mask::from_alpha(width, height, &alpha)
    }

    #[test]
    fn opacity_threshold_is_half_way() {
        let mask = Mask::from_alpha(2, 1, &[127, 128]);
        assert!(!mask.get(0, 0));
        assert!(mask.get(1, 0));
    }

    #[test]
    fn solid_masks_collide_when_regions_share_a_pixel() {
        let a = Mask::solid(4, 4);
        let b = Mask::solid(4, 4);
        assert!(a.overlaps((0, 0), &b, (3, 3)));
        assert!(!a.overlaps((0, 0), &b, (4, 3)));
    }

    #[test]
    fn zero_area_overlap_is_never_a_collision() {
        let a = Mask::solid(4, 4);
        let b = Mask::solid(4, 4);
        // edges touching exactly
        assert!(!a.overlaps((0, 0), &b, (4, 0)));
        assert!(!a.overlaps((0, 0), &b, (0, 4)));
    }

    #[test]
    fn transparent_pixels_do_not_collide() {
        let solid = Mask::solid(2, 2);
        let empty = Mask::from_alpha(2, 2, &[0, 0, 0, 0]);
        assert!(!solid.overlaps((0, 0), &empty, (0, 0)));
    }

    #[test]
    fn overlap_requires_both_masks_opaque_at_same_pixel() {
        // odd pixels of one mask against even pixels of the other
        let evens = checker(2, 1);
        let odds = Mask::from_alpha(2, 1, &[0, 255]);
        assert!(!evens.overlaps((0, 0), &odds, (0, 0)));
        // shift by one and the opaque pixels line up
        assert!(evens.overlaps((1, 0), &odds, (0, 0)));
    }

    #[test]
    fn flipping_mirrors_rows() {
        let mask = Mask::from_alpha(3, 2, &[255, 0, 0, 0, 0, 255]);
        let flipped = mask.flipped();
        assert!(flipped.get(2, 0));
        assert!(flipped.get(0, 1));
        assert!(!flipped.get(0, 0));
    }

    #[test]
    fn frames_persist_for_animation_delay_ticks() {
        let mut clips = HashMap::new();
        clips.insert(
            "run_right".to_string(),
            vec![fixtures::solid_frame(8, 8); 3],
        );
        let sheet = SpriteSheet::new(clips);

        let clip = sheet.clip("run_right").unwrap();
        for count in 0..ANIMATION_DELAY {
            let frame = sheet.frame("run_right", count).unwrap();
            assert!(std::ptr::eq(frame, &clip[0]));
        }
        let frame = sheet.frame("run_right", ANIMATION_DELAY).unwrap();
        assert!(std::ptr::eq(frame, &clip[1]));
        // wraps over the clip length
        let frame = sheet.frame("run_right", ANIMATION_DELAY * 3).unwrap();
        assert!(std::ptr::eq(frame, &clip[0]));
    }

    #[test]
    fn missing_clip_is_an_error() {
        let sheet = SpriteSheet::new(HashMap::new());
        assert!(sheet.frame("jump_left", 0).is_err());
    }

    #[test]
    fn frame_keys_parse_clip_and_index() {
        assert_eq!(parse_frame_key("run (3).png"), Some(("run", 3)));
        assert_eq!(parse_frame_key("double_jump (11)"), Some(("double_jump", 11)));
        assert_eq!(parse_frame_key("run.png"), None);
    }

    #[test]
    fn directional_sheets_gain_mirrored_left_clips() {
        let mut frames = HashMap::new();
        frames.insert(
            "run (1).png".to_string(),
            Cell {
                frame: SheetRect {
                    x: 0,
                    y: 0,
                    w: 2,
                    h: 1,
                },
            },
        );
        let sheet = Sheet { frames };
        // one opaque pixel on the left edge of the frame
        let alpha = AlphaMap {
            width: 2,
            height: 1,
            alpha: vec![255, 0],
        };

        let sprites = SpriteSheet::from_sheet(&sheet, &alpha, true).unwrap();
        let right = &sprites.clip("run_right").unwrap()[0];
        let left = &sprites.clip("run_left").unwrap()[0];
        assert!(!right.is_flipped());
        assert!(left.is_flipped());
        assert!(right.mask().get(0, 0));
        assert!(left.mask().get(1, 0));
    }
}
