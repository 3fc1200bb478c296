use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fx16_core::{
    globals::{FRAME_BUFFER_SIZE, SCREEN_HEIGHT, SCREEN_WIDTH},
    video, CpuError, Memory,
};
use softbuffer::{Context, SoftBufferError, Surface};
use thiserror::Error;
use tracing::{error, info};
use winit::{
    dpi::LogicalSize,
    error::{EventLoopError, OsError},
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use crate::machine::Machine;

const WINDOW_SIZE: u32 = 256;
const FRAME_TIME: Duration = Duration::from_micros(16_667);

/// Platform errors are kept as text; softbuffer's error carries window
/// handles and is neither `Send` nor `Sync`.
#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("event loop: {0}")]
    EventLoop(String),
    #[error("window: {0}")]
    Window(String),
    #[error("surface: {0}")]
    Surface(String),
    #[error(transparent)]
    Cpu(#[from] CpuError),
}
impl From<EventLoopError> for ScreenError {
    fn from(e: EventLoopError) -> Self {
        ScreenError::EventLoop(e.to_string())
    }
}
impl From<OsError> for ScreenError {
    fn from(e: OsError) -> Self {
        ScreenError::Window(e.to_string())
    }
}
impl From<SoftBufferError> for ScreenError {
    fn from(e: SoftBufferError) -> Self {
        ScreenError::Surface(e.to_string())
    }
}

/// Deadline for the tick after `due`. A host that fell behind (stalled,
/// suspended, slow frame) restarts the cadence from `now` instead of
/// running the missed frames back to back.
fn next_tick(due: Instant, now: Instant) -> Instant {
    let next = due + FRAME_TIME;
    if next < now {
        now + FRAME_TIME
    } else {
        next
    }
}

/// Where the scaled picture lands inside the window.
#[derive(Debug, PartialEq, Eq)]
struct Viewport {
    scale: usize,
    x: usize,
    y: usize,
}
impl Viewport {
    /// Largest whole scale that fits, centred. Never below 1, so tiny windows clip.
    fn fit(width: usize, height: usize) -> Self {
        let scale = (width / SCREEN_WIDTH).min(height / SCREEN_HEIGHT).max(1);
        Viewport {
            scale,
            x: width.saturating_sub(SCREEN_WIDTH * scale) / 2,
            y: height.saturating_sub(SCREEN_HEIGHT * scale) / 2,
        }
    }
}

/// Nearest-neighbour blit of a composed frame into a `width` x `height` target,
/// everything outside the picture painted with `border`.
fn blit_scaled(frame: &[u32], border: u32, out: &mut [u32], width: usize, height: usize) {
    let view = Viewport::fit(width, height);
    for dy in 0..height {
        let row = &mut out[dy * width..(dy + 1) * width];
        let sy = dy.wrapping_sub(view.y) / view.scale;
        if dy < view.y || sy >= SCREEN_HEIGHT {
            row.fill(border);
            continue;
        }
        for (dx, px) in row.iter_mut().enumerate() {
            let sx = dx.wrapping_sub(view.x) / view.scale;
            *px = if dx < view.x || sx >= SCREEN_WIDTH {
                border
            } else {
                frame[sy * SCREEN_WIDTH + sx]
            };
        }
    }
}

fn draw(
    surface: &mut Surface<Rc<Window>, Rc<Window>>,
    memory: &Memory,
    frame: &mut [u32; FRAME_BUFFER_SIZE],
    width: NonZeroU32,
    height: NonZeroU32,
) -> Result<(), SoftBufferError> {
    surface.resize(width, height)?;
    video::compose(memory, frame);
    let border = video::border_colour(memory).to_u32();
    let mut buffer = surface.buffer_mut()?;
    blit_scaled(&frame[..], border, &mut buffer, width.get() as usize, height.get() as usize);
    buffer.present()
}

/// Opens the window and runs one machine frame per display tick until the
/// window is closed or the CPU faults.
pub fn run(machine: &mut Machine) -> Result<(), ScreenError> {
    let event_loop = EventLoop::new()?;
    let window = Rc::new(
        WindowBuilder::new()
            .with_title("FX16")
            .with_inner_size(LogicalSize::new(WINDOW_SIZE, WINDOW_SIZE))
            .with_resizable(true)
            .build(&event_loop)?,
    );
    let context = Context::new(window.clone())?;
    let mut surface = Surface::new(&context, window.clone())?;
    let mut frame = [0u32; FRAME_BUFFER_SIZE];
    let mut failure: Option<ScreenError> = None;
    let mut due = Instant::now();

    event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => {
                info!("quit requested");
                elwt.exit();
            }
            WindowEvent::RedrawRequested => {
                let size = window.inner_size();
                let (Some(width), Some(height)) =
                    (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
                else {
                    return;
                };
                if let Err(e) = draw(&mut surface, machine.memory(), &mut frame, width, height) {
                    failure = Some(e.into());
                    elwt.exit();
                }
            }
            _ => (),
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if now >= due {
                due = next_tick(due, now);
                if let Err(e) = machine.frame() {
                    error!("cpu halted: {e}");
                    failure = Some(e.into());
                    elwt.exit();
                    return;
                }
                window.request_redraw();
            }
            elwt.set_control_flow(ControlFlow::WaitUntil(due));
        }
        _ => (),
    })?;

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_keeps_cadence() {
        let start = Instant::now();
        let due = next_tick(start, start + Duration::from_millis(1));
        assert!(due == start + FRAME_TIME);
    }

    #[test]
    fn tick_rebases_after_stall() {
        let start = Instant::now();
        let now = start + Duration::from_secs(2);
        let due = next_tick(start, now);
        assert!(due == now + FRAME_TIME);
        // the very next wakeup is not already late
        assert!(due > now);
    }

    #[test]
    fn errors_convert_to_diagnostics() {
        use miette::IntoDiagnostic;
        let errors = [
            ScreenError::EventLoop("gone".to_string()),
            ScreenError::Window("no display".to_string()),
            ScreenError::Surface("lost".to_string()),
            ScreenError::Cpu(CpuError::DivisionByZero { op: fx16_core::Op::Div, pc: 0x0100 }),
        ];
        for e in errors {
            let text = e.to_string();
            let report = Err::<(), _>(e).into_diagnostic().unwrap_err();
            assert!(report.to_string() == text);
        }
    }

    #[test]
    fn viewport_fits_whole_scale() {
        assert!(Viewport::fit(256, 256) == Viewport { scale: 2, x: 0, y: 0 });
        assert!(Viewport::fit(400, 300) == Viewport { scale: 2, x: 72, y: 22 });
        assert!(Viewport::fit(100, 100) == Viewport { scale: 1, x: 0, y: 0 });
    }

    #[test]
    fn blit_scales_and_borders() {
        let mut frame = vec![0u32; FRAME_BUFFER_SIZE];
        frame[0] = 0xAA;
        frame[FRAME_BUFFER_SIZE - 1] = 0xBB;
        let (w, h) = (260, 256);
        let mut out = vec![0u32; w * h];
        blit_scaled(&frame, 0x11, &mut out, w, h);
        // two columns of border on each side
        assert!(out[0] == 0x11);
        assert!(out[1] == 0x11);
        assert!(out[2] == 0xAA);
        assert!(out[3] == 0xAA);
        assert!(out[w + 2] == 0xAA);
        assert!(out[4] == 0);
        assert!(out[(h - 1) * w + 257] == 0xBB);
        assert!(out[(h - 1) * w + 258] == 0x11);
    }

    #[test]
    fn blit_clips_small_target() {
        let frame: Vec<u32> = (0..FRAME_BUFFER_SIZE as u32).collect();
        let mut out = vec![0u32; 4 * 2];
        blit_scaled(&frame, 0x11, &mut out, 4, 2);
        assert!(out == vec![0, 1, 2, 3, 128, 129, 130, 131]);
    }

    #[test]
    fn solid_red_frame() {
        let mut memory = Memory::new();
        memory.load(fx16_core::globals::PALETTE_ADDR, &[255, 0, 0]);
        let mut frame = [0u32; FRAME_BUFFER_SIZE];
        video::compose(&memory, &mut frame);
        let mut out = vec![0u32; 256 * 256];
        blit_scaled(&frame, video::border_colour(&memory).to_u32(), &mut out, 256, 256);
        assert!(out.iter().all(|px| *px == 0x00FF0000));
    }
}
