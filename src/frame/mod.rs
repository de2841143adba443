//! Per-frame control flow: background, simulation sub-steps, particle render,
//! readback and present.

mod zoom;

use zoom::ZoomState;

use crate::compute::{ComputeBackend, HostImage, ImageLayout};
use crate::error::AppError;

/// Sub-step multiplier while the fast modifier is held.
pub(crate) const FAST_MULTIPLIER: u32 = 4;

/// Input sampled once per frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct FrameInput {
    pub quit: bool,
    pub pause: bool,
    pub fast: bool,
    /// Wheel delta since the last frame, 120 units per notch.
    pub scroll_delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameReport {
    pub sub_steps: u32,
    pub zoom_stage: u32,
    /// 1-based index of the presented frame.
    pub frame: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameStatus {
    Presented(FrameReport),
    /// Computed but never shown; the presenter dropped it.
    Skipped,
    Quit,
}

/// What the presenter did with a finished frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PresentOutcome {
    Shown,
    Skipped,
}

/// Displays a finished frame.
pub(crate) trait Presenter {
    fn present(&mut self, image: &HostImage, overlay: &[String]) -> Result<PresentOutcome, AppError>;
}

/// Owns the compute backend and everything that persists between frames.
pub(crate) struct FrameOrchestrator<B: ComputeBackend> {
    backend: B,
    depth: u32,
    zoom: ZoomState,
    image: HostImage,
    frames: u64,
}

impl<B: ComputeBackend> FrameOrchestrator<B> {
    pub(crate) fn new(backend: B, depth: u32) -> Self {
        let image = HostImage::new(backend.layout());
        Self {
            backend,
            depth,
            zoom: ZoomState::default(),
            image,
            frames: 0,
        }
    }

    pub(crate) fn layout(&self) -> ImageLayout {
        self.image.layout()
    }

    /// Frames shown so far. Skipped frames are not counted.
    pub(crate) fn frames(&self) -> u64 {
        self.frames
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    fn sub_steps(&self, input: &FrameInput) -> u32 {
        match (input.pause, input.fast) {
            (true, _) => 0,
            (false, true) => self.depth.saturating_mul(FAST_MULTIPLIER),
            (false, false) => self.depth,
        }
    }

    /// Runs one frame. Any error is fatal to the frame loop.
    pub(crate) fn run_frame<P: Presenter>(
        &mut self,
        input: &FrameInput,
        presenter: &mut P,
    ) -> Result<FrameStatus, AppError> {
        if input.quit {
            return Ok(FrameStatus::Quit);
        }

        let background = self.backend.dispatch_background_render()?;

        let sub_steps = self.sub_steps(input);
        let mut last_step = None;
        for _ in 0..sub_steps {
            let step = self.backend.dispatch_simulation_step()?;
            // The next sub-step reads what this one writes
            self.backend.wait(std::slice::from_ref(&step))?;
            last_step = Some(step);
        }

        self.zoom.apply_scroll(input.scroll_delta);
        self.backend.set_zoom(self.zoom.factor())?;

        let mut wait_on = vec![background];
        wait_on.extend(last_step);
        let rendered = self.backend.dispatch_particle_render(&wait_on)?;

        self.backend.read_image(&rendered, self.image.bytes_mut())?;

        let info = self.backend.device_info();
        let overlay = [info.platform.clone(), info.device.clone(), self.zoom.ratio_label()];
        if presenter.present(&self.image, &overlay)? == PresentOutcome::Skipped {
            log::debug!("Frame not presented, skipping");
            return Ok(FrameStatus::Skipped);
        }

        self.frames += 1;
        let report = FrameReport {
            sub_steps,
            zoom_stage: self.zoom.stage(),
            frame: self.frames,
        };
        log::trace!("{report:?}");
        Ok(FrameStatus::Presented(report))
    }
}
