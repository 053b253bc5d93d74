// ==================== Imports ====================
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsValue;

#[macro_use]
mod browser;
mod collision;
mod engine;
mod game;
mod sprite;
mod world;

use engine::GameLoop;
use game::PlatformGame;

// ==================== Main Functions ====================
/// Main entry for the Webassembly module
/// - sets up panic reporting
/// - spawns the game loop on the local task queue
#[wasm_bindgen]
pub fn main_js() -> Result<(), JsValue> {
    // setup better panic messages for debugging
    console_error_panic_hook::set_once();

    // spawns a new asynchronous task in local thread, for web assembly
    // environment, using wasm_bindgen_futures
    browser::spawn_local(async move {
        let game = PlatformGame::new();
        GameLoop::start(game)
            .await
            .expect("Could not start game loop");
    });

    Ok(())
}
