//! Axis-separated collision resolution, run twice per tick: a horizontal
//! look-ahead probe before input is applied, then vertical resolution after
//! integration has already moved the body.

use crate::sprite::player::Player;
use crate::world::Obstacle;

/// Horizontal probe: tentatively translate the player by `dx`, test
/// mask-accurate overlap against every terrain object, undo the move, and
/// report the first hit. The caller gates input on the result, so the player
/// never interpenetrates terrain horizontally - there is no correction pass.
pub fn probe(player: &mut Player, obstacles: &[Obstacle], dx: f32) -> Option<usize> {
    player.move_by(dx, 0.0);
    let collided = obstacles
        .iter()
        .position(|obstacle| obstacle.collides_with(player.rect(), player.mask()));
    player.move_by(-dx, 0.0);
    collided
}

/// Vertical resolution: for every overlapping terrain object, snap the
/// player's bottom edge to the object's top and land, or the top edge to the
/// object's bottom and bounce, depending on the direction of travel. All
/// colliding objects are reported, not just the first - a floor and a hazard
/// can both matter in the same frame.
pub fn resolve_vertical(player: &mut Player, obstacles: &[Obstacle]) -> Vec<usize> {
    // dy is sampled once: land() zeroes the velocity mid-loop, and later
    // collisions in the same frame must still be classified by the original
    // direction of travel
    let dy = player.y_vel();
    let mut collided = Vec::new();
    for (index, obstacle) in obstacles.iter().enumerate() {
        if obstacle.collides_with(player.rect(), player.mask()) {
            if dy > 0.0 {
                player.snap_bottom_to(obstacle.rect().position.y);
                player.land();
            } else if dy < 0.0 {
                player.snap_top_to(obstacle.rect().bottom());
                player.hit_ceiling();
            }
            collided.push(index);
        }
    }
    collided
}
