use crate::browser;
use crate::collision;
use crate::engine::input::KeyState;
use crate::engine::{self, Game, Point, Rect, Renderer};
use crate::sprite::player::Player;
use crate::sprite::{Sheet, SpriteSheet};
use crate::world::{Axis, Coin, Obstacle};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::join;
use rand::Rng;
use std::rc::Rc;
use web_sys::HtmlImageElement;

pub const WIDTH: i16 = 1000;
pub const HEIGHT: i16 = 800;
pub const FPS: u32 = 60;
pub const PLAYER_VEL: f32 = 5.0;
const BLOCK_SIZE: i16 = 96;
const SCROLL_MARGIN: i16 = 200;
const SPAWN_DELAY_MS: f64 = 5_000.0;

/// TABLE
/// ┌───────────────────────── Tick Ordering ─────────────────────────────┐
/// │                                                                     │
/// │  input ─► zero x_vel ─► horizontal probe ─► gated move ─►           │
/// │  vertical integrate ─► vertical resolve ─► hazard check ─►          │
/// │  platform drive ─► animation ─► coin spawn ─► coin collect ─►       │
/// │  camera scroll                                                      │
/// │                                                                     │
/// │  Data flows one direction per tick; draw happens afterwards from    │
/// │  the resulting state and mutates nothing.                           │
/// └─────────────────────────────────────────────────────────────────────┘
/// The probe step is 2x the movement speed on purpose: a conservative
/// over-probe whose ratio changes collision gating at edges and corners,
/// so it stays fixed.
pub struct World {
    player: Player,
    obstacles: Vec<Obstacle>,
    coins: Vec<Coin>,
    coin_count: u32,
    offset_x: f32,
    last_spawn: f64,
    jump_held: bool,
    running: bool,
}

/// The held keys the simulation actually reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inputs {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub quit: bool,
}

impl Inputs {
    pub fn read(keystate: &KeyState) -> Self {
        Inputs {
            left: keystate.is_pressed("ArrowLeft"),
            right: keystate.is_pressed("ArrowRight"),
            jump: keystate.is_pressed("Space"),
            quit: keystate.is_pressed("Escape"),
        }
    }
}

impl World {
    pub fn new(player: Player, obstacles: Vec<Obstacle>, now_ms: f64) -> Self {
        World {
            player,
            obstacles,
            coins: Vec::new(),
            coin_count: 0,
            offset_x: 0.0,
            last_spawn: now_ms,
            jump_held: false,
            running: true,
        }
    }

    /// One fixed-rate simulation tick.
    pub fn tick(&mut self, input: &Inputs, now_ms: f64) -> Result<()> {
        if input.quit {
            // normal terminal transition, nothing from this frame persists
            self.running = false;
            return Ok(());
        }

        // jump is edge-triggered: one impulse per press, at most two per
        // airtime - the precondition jump() relies on is enforced here
        if input.jump && !self.jump_held && self.player.jump_count() < 2 {
            self.player.jump();
        }
        self.jump_held = input.jump;

        self.player.stop();
        let left_hit = collision::probe(&mut self.player, &self.obstacles, -2.0 * PLAYER_VEL);
        let right_hit = collision::probe(&mut self.player, &self.obstacles, 2.0 * PLAYER_VEL);
        if input.left && left_hit.is_none() {
            self.player.move_left(PLAYER_VEL);
        }
        if input.right && right_hit.is_none() {
            self.player.move_right(PLAYER_VEL);
        }

        self.player.integrate(FPS);
        let vertical_hits = collision::resolve_vertical(&mut self.player, &self.obstacles);

        // any hazard among the probe or resolution results stuns the player,
        // regardless of collision direction
        let touched_hazard = left_hit
            .into_iter()
            .chain(right_hit)
            .chain(vertical_hits)
            .any(|index| self.obstacles[index].is_hazard());
        if touched_hazard {
            self.player.register_hit();
        }

        // platforms advance after resolution; a platform may overlap the
        // player for one frame without a corrective response - accepted
        // behavior, pinned by test
        for obstacle in &mut self.obstacles {
            obstacle.advance();
        }

        self.player.update_sprite()?;
        for obstacle in &mut self.obstacles {
            obstacle.animate()?;
        }

        self.maybe_spawn_coin(now_ms);
        self.collect_coins();
        self.scroll();
        Ok(())
    }

    fn maybe_spawn_coin(&mut self, now_ms: f64) {
        if now_ms - self.last_spawn <= SPAWN_DELAY_MS {
            return;
        }
        self.last_spawn = now_ms;
        let (x, y) = spawn_position(&mut rand::thread_rng());
        self.spawn_coin_at(x, y);
    }

    /// Placement over terrain is rejected outright; the spawn timer simply
    /// runs again. Deliberately a bounding-box check, not a mask check.
    pub fn spawn_coin_at(&mut self, x: f32, y: f32) -> bool {
        let coin = Coin::new(x, y);
        if self
            .obstacles
            .iter()
            .any(|obstacle| coin.rect.intersects(obstacle.rect()))
        {
            return false;
        }
        self.coins.push(coin);
        true
    }

    /// Coarse rectangle test against the player, one count per coin.
    fn collect_coins(&mut self) {
        let player_rect = *self.player.rect();
        let mut collected = 0;
        self.coins.retain(|coin| {
            if coin.rect.intersects(&player_rect) {
                collected += 1;
                false
            } else {
                true
            }
        });
        self.coin_count += collected;
    }

    /// Dead-zoned camera: the offset follows the player's velocity only once
    /// they push into the margin at either screen edge.
    fn scroll(&mut self) {
        let rect = self.player.rect();
        let x_vel = self.player.x_vel();
        let near_right =
            rect.right() - self.offset_x >= (WIDTH - SCROLL_MARGIN) as f32 && x_vel > 0.0;
        let near_left = rect.position.x - self.offset_x <= SCROLL_MARGIN as f32 && x_vel < 0.0;
        if near_right || near_left {
            self.offset_x += x_vel;
        }
    }

    pub fn coin_count(&self) -> u32 {
        self.coin_count
    }

    pub fn offset_x(&self) -> f32 {
        self.offset_x
    }

    pub fn is_finished(&self) -> bool {
        !self.running
    }
}

/// Loaded session: the simulation plus the images draw calls index into.
pub struct Level {
    world: World,
    background: HtmlImageElement,
    player_image: HtmlImageElement,
    terrain_image: HtmlImageElement,
    fire_image: HtmlImageElement,
    coin_image: HtmlImageElement,
}

impl Level {
    // Draw order matters : background -> coins -> terrain -> player -> HUD
    fn draw(&self, renderer: &Renderer) {
        renderer.clear(&Rect::new_at(0.0, 0.0, WIDTH, HEIGHT));
        self.draw_background(renderer);
        for coin in &self.world.coins {
            coin.draw(renderer, &self.coin_image, self.world.offset_x);
        }
        for obstacle in &self.world.obstacles {
            let image = if obstacle.is_hazard() {
                &self.fire_image
            } else {
                &self.terrain_image
            };
            obstacle.draw(renderer, image, self.world.offset_x);
        }
        self.world
            .player
            .draw(renderer, &self.player_image, self.world.offset_x);
        // fill_text positions the baseline, so the HUD sits one line down
        renderer.draw_text(
            &format!("Coins: {}", self.world.coin_count),
            &Point { x: 10.0, y: 40.0 },
        );
    }

    fn draw_background(&self, renderer: &Renderer) {
        let tile_width = (self.background.width() as i16).max(1);
        let tile_height = (self.background.height() as i16).max(1);
        for i in 0..=WIDTH / tile_width {
            for j in 0..=HEIGHT / tile_height {
                renderer.draw_entire_image(
                    &self.background,
                    &Point {
                        x: (i * tile_width) as f32,
                        y: (j * tile_height) as f32,
                    },
                );
            }
        }
    }
}

pub enum PlatformGame {
    /// Initialize state while resources are being loaded
    /// Transition to `Loaded` once initialization is complete
    Loading,

    /// Active session with all assets resolved
    Loaded(Box<Level>),
}

impl PlatformGame {
    const PLAYER_SHEET_PATH: &'static str = "mask_dude.json";
    const PLAYER_IMAGE_PATH: &'static str = "mask_dude.png";
    const FIRE_SHEET_PATH: &'static str = "fire.json";
    const FIRE_IMAGE_PATH: &'static str = "fire.png";
    const BACKGROUND_PATH: &'static str = "Blue.png";
    const TERRAIN_PATH: &'static str = "Terrain.png";
    const COIN_PATH: &'static str = "coin_0.png";

    pub fn new() -> Self {
        PlatformGame::Loading
    }

    /// Fetch a sheet description and its image in parallel, then derive the
    /// collision masks from the image's alpha channel.
    async fn load_sprites(
        sheet_path: &str,
        image_path: &str,
        directional: bool,
    ) -> Result<(Rc<SpriteSheet>, HtmlImageElement)> {
        let (sheet, image) = join!(
            browser::fetch_json::<Sheet>(sheet_path),
            engine::load_image(image_path),
        );
        let sheet =
            sheet.with_context(|| format!("Failed to load sprite sheet from : {}", sheet_path))?;
        let image = image.with_context(|| {
            format!("Failed to load sprite image resource from : {}", image_path)
        })?;
        let alpha = engine::read_alpha(&image)?;
        let sprites = SpriteSheet::from_sheet(&sheet, &alpha, directional)
            .with_context(|| format!("Malformed sprite sheet : {}", sheet_path))?;
        Ok((Rc::new(sprites), image))
    }
}

#[async_trait(?Send)]
impl Game for PlatformGame {
    async fn initialize(&self) -> Result<Box<dyn Game>> {
        match self {
            PlatformGame::Loading => {
                let (player_assets, fire_assets) = join!(
                    Self::load_sprites(Self::PLAYER_SHEET_PATH, Self::PLAYER_IMAGE_PATH, true),
                    Self::load_sprites(Self::FIRE_SHEET_PATH, Self::FIRE_IMAGE_PATH, false),
                );
                let (player_sprites, player_image) = player_assets?;
                let (fire_sprites, fire_image) = fire_assets?;
                let background = engine::load_image(Self::BACKGROUND_PATH).await?;
                let terrain_image = engine::load_image(Self::TERRAIN_PATH).await?;
                let coin_image = engine::load_image(Self::COIN_PATH).await?;

                let player = Player::new(10.0, 100.0, player_sprites)?;
                let mut world = World::new(player, level_obstacles(fire_sprites)?, browser::now()?);
                // seed coin from the hard-coded level
                world.coins.push(Coin::new(100.0, 250.0));

                Ok(Box::new(PlatformGame::Loaded(Box::new(Level {
                    world,
                    background,
                    player_image,
                    terrain_image,
                    fire_image,
                    coin_image,
                }))))
            }
            PlatformGame::Loaded(_) => Err(anyhow!("Game is already initialized")),
        }
    }

    fn update(&mut self, keystate: &KeyState) {
        if let PlatformGame::Loaded(level) = self {
            let now = browser::now().expect("wall clock unavailable");
            level
                .world
                .tick(&Inputs::read(keystate), now)
                .expect("animation clip missing for a computed state");
        }
    }

    fn draw(&self, renderer: &Renderer) {
        if let PlatformGame::Loaded(level) = self {
            level.draw(renderer);
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self, PlatformGame::Loaded(level) if level.world.is_finished())
    }
}

/// Candidate coin placement: anywhere across the screen width, vertically
/// between the HUD band and the floor row. Both bounds are inclusive.
fn spawn_position(rng: &mut impl Rng) -> (f32, f32) {
    let x = rng.gen_range(0..=WIDTH - Coin::SIZE) as f32;
    let y = rng.gen_range(100..=HEIGHT - BLOCK_SIZE - Coin::SIZE) as f32;
    (x, y)
}

/// The hard-coded level: a floor spanning three screen widths, four fixed
/// platforms, two moving platforms, one lit fire trap.
fn level_obstacles(fire_sprites: Rc<SpriteSheet>) -> Result<Vec<Obstacle>> {
    let block = BLOCK_SIZE as f32;
    let height = HEIGHT as f32;

    let mut obstacles: Vec<Obstacle> = (-(WIDTH / BLOCK_SIZE)..(WIDTH * 2) / BLOCK_SIZE)
        .map(|i| Obstacle::block(i as f32 * block, height - block, BLOCK_SIZE))
        .collect();
    obstacles.extend([
        Obstacle::block(200.0, height - block * 2.0, BLOCK_SIZE),
        Obstacle::block(400.0, height - block * 4.0, BLOCK_SIZE),
        Obstacle::block(600.0, height - block * 6.0, BLOCK_SIZE),
        Obstacle::block(800.0, height - block * 3.0, BLOCK_SIZE),
        Obstacle::platform(
            300.0,
            height - block * 3.0,
            BLOCK_SIZE,
            Axis::Horizontal,
            150.0,
            3.0,
        ),
        Obstacle::platform(
            700.0,
            height - block * 5.0,
            BLOCK_SIZE,
            Axis::Vertical,
            100.0,
            2.0,
        ),
    ]);

    let mut fire = Obstacle::fire(100.0, height - block - 64.0, fire_sprites)?;
    fire.set_lit(true);
    obstacles.push(fire);
    Ok(obstacles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::fixtures;
    use crate::sprite::player::Pose;
    use approx::assert_abs_diff_eq;

    const NO_INPUT: Inputs = Inputs {
        left: false,
        right: false,
        jump: false,
        quit: false,
    };

    fn world_with_player_at(x: f32, y: f32, obstacles: Vec<Obstacle>) -> World {
        let player = Player::new(x, y, fixtures::player_sheet()).unwrap();
        World::new(player, obstacles, 0.0)
    }

    fn floor() -> Vec<Obstacle> {
        vec![Obstacle::block(0.0, 600.0, 96)]
    }

    #[test]
    fn resting_player_lands_again_within_the_same_tick() {
        // bottom flush with the block top, gravity ramp saturated
        let mut world = world_with_player_at(20.0, 568.0, floor());
        world.player.set_fall_count(FPS);

        world.tick(&NO_INPUT, 0.0).unwrap();

        assert_abs_diff_eq!(world.player.y_vel(), 0.0);
        assert_abs_diff_eq!(world.player.rect().bottom(), 600.0);
        assert_eq!(world.player.pose(), Pose::Idle);
    }

    #[test]
    fn gated_horizontal_move_is_fully_prevented() {
        // block 8px to the right, well inside the 2x probe step
        let mut world = world_with_player_at(150.0, 500.0, vec![Obstacle::block(190.0, 500.0, 96)]);
        let input = Inputs {
            right: true,
            ..NO_INPUT
        };

        world.tick(&input, 0.0).unwrap();
        assert_abs_diff_eq!(world.player.rect().position.x, 150.0);

        // and symmetrically on the left
        let mut world = world_with_player_at(150.0, 500.0, vec![Obstacle::block(46.0, 500.0, 96)]);
        let input = Inputs {
            left: true,
            ..NO_INPUT
        };

        world.tick(&input, 0.0).unwrap();
        assert_abs_diff_eq!(world.player.rect().position.x, 150.0);
    }

    #[test]
    fn third_jump_is_never_invoked() {
        let mut world = world_with_player_at(10.0, 100.0, Vec::new());
        let jump = Inputs {
            jump: true,
            ..NO_INPUT
        };

        world.tick(&jump, 0.0).unwrap();
        assert_eq!(world.player.jump_count(), 1);
        world.tick(&NO_INPUT, 0.0).unwrap();
        world.tick(&jump, 0.0).unwrap();
        assert_eq!(world.player.jump_count(), 2);
        world.tick(&NO_INPUT, 0.0).unwrap();
        world.tick(&jump, 0.0).unwrap();

        // still two jumps, and no fresh impulse was applied
        assert_eq!(world.player.jump_count(), 2);
        assert!(world.player.y_vel() > -8.0 && world.player.y_vel() < 0.0);
    }

    #[test]
    fn held_jump_key_fires_once() {
        let mut world = world_with_player_at(10.0, 100.0, Vec::new());
        let jump = Inputs {
            jump: true,
            ..NO_INPUT
        };

        world.tick(&jump, 0.0).unwrap();
        world.tick(&jump, 0.0).unwrap();
        assert_eq!(world.player.jump_count(), 1);
    }

    #[test]
    fn spawn_positions_cover_the_inclusive_extremes() {
        let mut rng = rand::thread_rng();
        let mut min = (f32::MAX, f32::MAX);
        let mut max = (f32::MIN, f32::MIN);
        for _ in 0..100_000 {
            let (x, y) = spawn_position(&mut rng);
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }
        // both interval ends are reachable placements
        assert_eq!(min, (0.0, 100.0));
        assert_eq!(
            max,
            (
                (WIDTH - Coin::SIZE) as f32,
                (HEIGHT - BLOCK_SIZE - Coin::SIZE) as f32,
            )
        );
    }

    #[test]
    fn coin_spawn_over_terrain_is_rejected() {
        let mut world = world_with_player_at(900.0, 100.0, floor());

        assert!(!world.spawn_coin_at(50.0, 650.0));
        assert_eq!(world.coins.len(), 0);

        assert!(world.spawn_coin_at(50.0, 100.0));
        assert_eq!(world.coins.len(), 1);
    }

    #[test]
    fn collection_is_monotonic_and_exact() {
        let mut world = world_with_player_at(10.0, 100.0, Vec::new());
        world.coins.push(Coin::new(20.0, 110.0)); // overlaps the player
        world.coins.push(Coin::new(500.0, 110.0)); // far away

        world.tick(&NO_INPUT, 0.0).unwrap();
        assert_eq!(world.coin_count(), 1);
        assert_eq!(world.coins.len(), 1);

        for _ in 0..10 {
            world.tick(&NO_INPUT, 0.0).unwrap();
            assert_eq!(world.coin_count(), 1);
        }
    }

    #[test]
    fn camera_scrolls_only_inside_the_margin() {
        // mid-screen: moving right does not scroll
        let mut world = world_with_player_at(400.0, 100.0, Vec::new());
        let right = Inputs {
            right: true,
            ..NO_INPUT
        };
        world.tick(&right, 0.0).unwrap();
        assert_abs_diff_eq!(world.offset_x(), 0.0);

        // inside the right margin: offset follows the velocity
        let mut world = world_with_player_at(790.0, 100.0, Vec::new());
        world.tick(&right, 0.0).unwrap();
        assert_abs_diff_eq!(world.offset_x(), PLAYER_VEL);
    }

    #[test]
    fn quit_ends_the_session_without_side_effects() {
        let mut world = world_with_player_at(20.0, 568.0, floor());
        let before = *world.player.rect();

        let quit = Inputs {
            quit: true,
            ..NO_INPUT
        };
        world.tick(&quit, 0.0).unwrap();

        assert!(world.is_finished());
        assert_eq!(*world.player.rect(), before);
    }

    #[test]
    fn platforms_advance_after_collision_resolution() {
        // the player lands on the platform at its pre-advance position, then
        // the platform slides on underneath - the accepted one-frame slip
        let platform = Obstacle::platform(300.0, 600.0, 96, Axis::Horizontal, 150.0, 3.0);
        let mut world = world_with_player_at(310.0, 568.0, vec![platform]);
        world.player.set_fall_count(FPS);

        world.tick(&NO_INPUT, 0.0).unwrap();

        assert_abs_diff_eq!(world.player.rect().bottom(), 600.0);
        assert_abs_diff_eq!(world.player.rect().position.x, 310.0);
        assert_abs_diff_eq!(world.obstacles[0].rect().position.x, 303.0);
    }

    #[test]
    fn touching_fire_stuns_the_player() {
        let mut fire = Obstacle::fire(100.0, 600.0, fixtures::fire_sheet()).unwrap();
        fire.set_lit(true);
        let mut world = world_with_player_at(100.0, 568.0, vec![fire]);
        world.player.set_fall_count(FPS);

        world.tick(&NO_INPUT, 0.0).unwrap();

        assert!(world.player.is_hit());
        assert_eq!(world.player.pose(), Pose::Hit);
    }
}
