use crate::browser;
use crate::sprite::AlphaMap;
use anyhow::{anyhow, Error, Result};
// ELI5: web assembly is a single threaded environment, so Rc RefCell > Mutex
use async_trait::async_trait;
use futures::channel::oneshot::channel;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::{
    // unchecked_ref (unsafe) cast from Javascript type to Rust type
    // - because we control the closure creation and specify the expected type,
    // in principle this should be generally safe (unsafe) code
    JsCast,
    JsValue,
};
use web_sys::{CanvasRenderingContext2d, HtmlImageElement};

use self::input::KeyState;

#[async_trait(?Send)]
pub trait Game {
    async fn initialize(&self) -> Result<Box<dyn Game>>;
    fn update(&mut self, keystate: &KeyState);
    fn draw(&self, renderer: &Renderer);
    /// Cooperative quit flag, polled once per rendered frame. Past-the-end
    /// frames are simply never scheduled.
    fn is_finished(&self) -> bool {
        false
    }
}

// length of a frame in milliseconds
const FRAME_SIZE: f32 = 1.0 / 60.0 * 1000.0;

pub struct GameLoop {
    last_frame: f64,
    accumulated_delta: f32,
}

type SharedLoopClosure = Rc<RefCell<Option<browser::LoopClosure>>>;

impl GameLoop {
    pub async fn start(game: impl Game + 'static) -> Result<()> {
        let mut keyevent_receiver = input::prepare_input()?;
        let mut game = game.initialize().await?;
        let mut game_loop = GameLoop {
            last_frame: browser::now()?,
            accumulated_delta: 0.0,
        };
        let renderer = Renderer {
            context: browser::context()?,
        };
        let mut keystate = KeyState::new();
        let f: SharedLoopClosure = Rc::new(RefCell::new(None));
        let g = f.clone();
        *g.borrow_mut() = Some(browser::create_raf_closure(move |perf: f64| {
            input::process_input(&mut keystate, &mut keyevent_receiver);
            game_loop.accumulated_delta += (perf - game_loop.last_frame) as f32;
            while game_loop.accumulated_delta > FRAME_SIZE {
                game.update(&keystate);
                game_loop.accumulated_delta -= FRAME_SIZE;
            }
            game_loop.last_frame = perf;
            game.draw(&renderer);
            if game.is_finished() {
                log!("session finished, no further frames scheduled");
                return;
            }
            let _ = browser::request_animation_frame(f.borrow().as_ref().unwrap());
        }));

        browser::request_animation_frame(
            g.borrow()
                .as_ref()
                .ok_or_else(|| anyhow!("GameLoop: Loop is None"))?,
        )?;

        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: i16,
    pub height: i16,
}

/// Axis-aligned bounding box. The position moves every frame; the size is
/// fixed at construction and only ever replaced wholesale, together with a
/// matching collision mask, when a new sprite frame is selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub position: Point,
    size: Size,
}

impl Rect {
    pub fn new(position: Point, size: Size) -> Self {
        assert!(
            size.width > 0 && size.height > 0,
            "Rect must have a positive extent"
        );
        Rect { position, size }
    }

    pub fn new_at(x: f32, y: f32, width: i16, height: i16) -> Self {
        Rect::new(Point { x, y }, Size { width, height })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> i16 {
        self.size.width
    }

    pub fn height(&self) -> i16 {
        self.size.height
    }

    pub fn right(&self) -> f32 {
        self.position.x + self.size.width as f32
    }

    pub fn bottom(&self) -> f32 {
        self.position.y + self.size.height as f32
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.position.x += dx;
        self.position.y += dy;
    }

    /// Coarse overlap test used for coins and spawn placement. Strict
    /// inequalities: touching edges (zero-area overlap) do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.position.x < other.right()
            && self.right() > other.position.x
            && self.position.y < other.bottom()
            && self.bottom() > other.position.y
    }

    /// Top-left corner on the pixel grid. Sub-pixel motion accumulates in
    /// the float position but the mask lives on whole pixels.
    pub fn pixel_origin(&self) -> (i32, i32) {
        (
            self.position.x.floor() as i32,
            self.position.y.floor() as i32,
        )
    }
}

pub struct Renderer {
    context: CanvasRenderingContext2d,
}

impl Renderer {
    pub fn clear(&self, rect: &Rect) {
        self.context.clear_rect(
            rect.position.x.into(),
            rect.position.y.into(),
            rect.width().into(),
            rect.height().into(),
        );
    }

    pub fn draw_image(&self, image: &HtmlImageElement, frame: &Rect, destination: &Rect) {
        self.context
            .draw_image_with_html_image_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
                image,
                frame.position.x.into(),
                frame.position.y.into(),
                frame.width().into(),
                frame.height().into(),
                destination.position.x.into(),
                destination.position.y.into(),
                destination.width().into(),
                destination.height().into(),
            )
            .expect("Drawing is throwing exceptions! Unrecoverable error");
    }

    /// Mirrored draw for left-facing sprite frames. The context is flipped
    /// around the y axis, so the destination lands at its negated right edge.
    pub fn draw_image_flipped(&self, image: &HtmlImageElement, frame: &Rect, destination: &Rect) {
        self.context.save();
        self.context
            .scale(-1.0, 1.0)
            .expect("Drawing is throwing exceptions! Unrecoverable error");
        self.context
            .draw_image_with_html_image_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
                image,
                frame.position.x.into(),
                frame.position.y.into(),
                frame.width().into(),
                frame.height().into(),
                (-destination.right()).into(),
                destination.position.y.into(),
                destination.width().into(),
                destination.height().into(),
            )
            .expect("Drawing is throwing exceptions! Unrecoverable error");
        self.context.restore();
    }

    pub fn draw_entire_image(&self, image: &HtmlImageElement, position: &Point) {
        self.context
            .draw_image_with_html_image_element(image, position.x.into(), position.y.into())
            .expect("Drawing is throwing exceptions! Unrecoverable error");
    }

    pub fn draw_text(&self, text: &str, location: &Point) {
        self.context.set_font("30px sans-serif");
        self.context.set_fill_style_str("yellow");
        self.context
            .fill_text(text, location.x.into(), location.y.into())
            .expect("Text drawing is throwing exceptions! Unrecoverable error");
    }

    #[cfg(debug_assertions)]
    fn draw_stroke_rect(&self, rect: &Rect) {
        self.context.set_stroke_style_str("#FF0000");
        self.context.stroke_rect(
            rect.position.x.into(),
            rect.position.y.into(),
            rect.width().into(),
            rect.height().into(),
        );
    }
}

#[cfg(debug_assertions)]
pub trait DebugDraw {
    fn draw_debug(&self, renderer: &Renderer);
}

#[cfg(debug_assertions)]
impl DebugDraw for Rect {
    fn draw_debug(&self, renderer: &Renderer) {
        renderer.draw_stroke_rect(self);
    }
}

/// Asynchronously load an image from a given source path
/// # Arguments
/// * `source` - string slice to path/url
/// # Returns
/// * `Ok(HtmlImageElement)` - on load success
/// * `Err` - on load fail
pub async fn load_image(source: &str) -> Result<HtmlImageElement> {
    let image = browser::new_image()?;
    let (tx, rx) = channel::<Result<(), Error>>();
    let success_tx = Rc::new(RefCell::new(Some(tx)));
    let error_tx = success_tx.clone();

    let success_callback = browser::closure_once(move || {
        if let Some(tx) = success_tx.borrow_mut().take() {
            let _ = tx.send(Ok(()));
        }
    });

    let error_callback = browser::closure_once(move |err: JsValue| {
        if let Some(tx) = error_tx.borrow_mut().take() {
            let _ = tx.send(Err(anyhow!(
                "[engine.rs::load_image] Error loading image: {:#?}",
                err
            )));
        }
    });

    image.set_onload(Some(success_callback.as_ref().unchecked_ref()));
    image.set_onerror(Some(error_callback.as_ref().unchecked_ref()));
    image.set_src(source);

    // keep callback alive until image is loaded or errors
    success_callback.forget();
    error_callback.forget();

    // ?? - double unwrap because Result<Result<(), Error>, oneshot::Canceled>
    // - first unwrap yields channel result : Result<(), Error>
    // - second unwrap yields image load result : () or propagating Error
    rx.await??;

    Ok(image)
}

/// Read the alpha channel of a loaded image by blitting it to a scratch
/// canvas. Collision masks are sliced out of the result per sprite frame.
pub fn read_alpha(image: &HtmlImageElement) -> Result<AlphaMap> {
    let width = image.width();
    let height = image.height();
    let canvas = browser::new_canvas()?;
    canvas.set_width(width);
    canvas.set_height(height);
    let context = browser::context_of(&canvas)?;
    context
        .draw_image_with_html_image_element(image, 0.0, 0.0)
        .map_err(|err| anyhow!("Could not blit image to scratch canvas : {:#?}", err))?;
    let data = context
        .get_image_data(0.0, 0.0, width as f64, height as f64)
        .map_err(|err| anyhow!("Could not read image data : {:#?}", err))?
        .data();

    Ok(AlphaMap::from_rgba(width as i16, height as i16, &data))
}

pub mod input {
    use crate::browser;
    use anyhow::Result;
    use futures::channel::mpsc::{unbounded, UnboundedReceiver};
    use std::collections::HashMap;
    use wasm_bindgen::JsCast;

    pub enum KeyPress {
        KeyUp(web_sys::KeyboardEvent),
        KeyDown(web_sys::KeyboardEvent),
    }

    /// Held-key set, refreshed from the event channel once per animation
    /// frame. The simulation reads exactly: left, right, jump, quit.
    pub struct KeyState {
        pressed_keys: HashMap<String, web_sys::KeyboardEvent>,
    }

    impl KeyState {
        pub fn new() -> Self {
            KeyState {
                pressed_keys: HashMap::new(),
            }
        }

        pub fn is_pressed(&self, code: &str) -> bool {
            self.pressed_keys.contains_key(code)
        }

        fn set_pressed(&mut self, code: &str, event: web_sys::KeyboardEvent) {
            self.pressed_keys.insert(code.into(), event);
        }

        fn set_released(&mut self, code: &str) {
            self.pressed_keys.remove(code);
        }
    }

    pub fn prepare_input() -> Result<UnboundedReceiver<KeyPress>> {
        let (keyevent_sender, keyevent_receiver) = unbounded();
        let keydown_sender = keyevent_sender.clone();
        let keyup_sender = keyevent_sender;

        let onkeydown = browser::closure_wrap(Box::new(move |keycode: web_sys::KeyboardEvent| {
            let _ = keydown_sender.unbounded_send(KeyPress::KeyDown(keycode));
        }) as Box<dyn FnMut(web_sys::KeyboardEvent)>);

        let onkeyup = browser::closure_wrap(Box::new(move |keycode: web_sys::KeyboardEvent| {
            let _ = keyup_sender.unbounded_send(KeyPress::KeyUp(keycode));
        }) as Box<dyn FnMut(web_sys::KeyboardEvent)>);

        let canvas = browser::canvas()?;
        canvas.set_onkeydown(Some(onkeydown.as_ref().unchecked_ref()));
        canvas.set_onkeyup(Some(onkeyup.as_ref().unchecked_ref()));
        // listeners live for the whole session
        onkeydown.forget();
        onkeyup.forget();

        Ok(keyevent_receiver)
    }

    pub fn process_input(
        state: &mut KeyState,
        keyevent_receiver: &mut UnboundedReceiver<KeyPress>,
    ) {
        loop {
            match keyevent_receiver.try_next() {
                Ok(None) => break,
                Err(_err) => break,
                Ok(Some(event)) => match event {
                    KeyPress::KeyUp(event) => state.set_released(&event.code()),
                    KeyPress::KeyDown(event) => {
                        let code = event.code();
                        state.set_pressed(&code, event);
                    }
                },
            }
        }
    }
}
