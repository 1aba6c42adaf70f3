//! Frame position and playback state of one control

use std::fmt;

use crate::core::AnimClock;

/// Playback mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayMode {
    /// Held at one frame
    Pose,
    /// Running once from start to end, then holding the last frame
    Play,
    /// Running and wrapping around
    Loop,
    /// Running forward then backward
    Pingpong,
}

/// Floored modulo for floats: result in `[0, b)`
fn cmod(a: f64, b: f64) -> f64 {
    a - (a / b).floor() * b
}

/// Floored modulo for integers: result in `[0, b)`
fn imod(a: i64, b: i64) -> i64 {
    a.rem_euclid(b)
}

/// Playback clock math.
///
/// The current frame is derived on demand from the frame clock, the start
/// time and the effective rate, so nothing needs to be ticked per frame.
#[derive(Clone)]
pub struct AnimInterface {
    clock: AnimClock,
    num_frames: usize,
    frame_rate: f64,
    play_mode: PlayMode,
    start_time: f64,
    start_frame: f64,
    play_frames: f64,
    from_frame: i64,
    to_frame: i64,
    play_rate: f64,
    effective_frame_rate: f64,
    paused: bool,
    paused_f: f64,
}

impl AnimInterface {
    pub fn new(clock: AnimClock, frame_rate: f64, num_frames: usize) -> Self {
        Self {
            clock,
            num_frames,
            frame_rate,
            play_mode: PlayMode::Pose,
            start_time: 0.0,
            start_frame: 0.0,
            play_frames: 0.0,
            from_frame: 0,
            to_frame: 0,
            play_rate: 1.0,
            effective_frame_rate: frame_rate,
            paused: frame_rate == 0.0,
            paused_f: 0.0,
        }
    }

    fn now(&self) -> f64 {
        self.clock.frame_time()
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub(crate) fn set_num_frames(&mut self, num_frames: usize) {
        self.num_frames = num_frames;
    }

    /// Frames per second after the play rate is applied
    pub fn frame_rate(&self) -> f64 {
        self.effective_frame_rate
    }

    pub fn base_frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub(crate) fn set_frame_rate(&mut self, frame_rate: f64) {
        self.set_rate(frame_rate, self.play_rate);
    }

    pub fn play_rate(&self) -> f64 {
        self.play_rate
    }

    pub fn play_mode(&self) -> PlayMode {
        self.play_mode
    }

    /// Change the speed without moving the current frame. A rate of zero
    /// pauses; negative rates play backward.
    pub fn set_play_rate(&mut self, play_rate: f64) {
        self.set_rate(self.frame_rate, play_rate);
    }

    fn set_rate(&mut self, frame_rate: f64, play_rate: f64) {
        let f = self.get_f();
        self.frame_rate = frame_rate;
        self.play_rate = play_rate;
        self.effective_frame_rate = frame_rate * play_rate;

        if self.effective_frame_rate == 0.0 {
            self.paused_f = f;
            self.paused = true;
        } else {
            self.start_time = self.now() - f / self.effective_frame_rate;
            self.paused = false;
        }
    }

    /// Play the whole animation once
    pub fn play(&mut self) {
        self.play_range(0.0, self.last_frame());
    }

    /// Play frames `from..=to` once
    pub fn play_range(&mut self, from: f64, to: f64) {
        if from >= to {
            self.pose(from);
            return;
        }
        self.start_range(PlayMode::Play, from, to);
        if self.effective_frame_rate < 0.0 {
            // Backward play starts at the far end
            self.start_time -= self.play_frames / self.effective_frame_rate;
        }
    }

    /// Loop the whole animation. Without `restart` the current frame is
    /// kept.
    pub fn loop_anim(&mut self, restart: bool) {
        self.loop_range(restart, 0.0, self.last_frame());
    }

    pub fn loop_range(&mut self, restart: bool, from: f64, to: f64) {
        self.cycle_range(PlayMode::Loop, restart, from, to);
    }

    /// Play forward and backward repeatedly
    pub fn pingpong(&mut self, restart: bool) {
        self.pingpong_range(restart, 0.0, self.last_frame());
    }

    pub fn pingpong_range(&mut self, restart: bool, from: f64, to: f64) {
        self.cycle_range(PlayMode::Pingpong, restart, from, to);
    }

    /// Hold at `frame`
    pub fn pose(&mut self, frame: f64) {
        self.play_mode = PlayMode::Pose;
        self.start_time = self.now();
        self.start_frame = frame;
        self.play_frames = 0.0;
        self.from_frame = frame.floor() as i64;
        self.to_frame = self.from_frame;
        self.paused_f = 0.0;
    }

    /// Hold at the current frame
    pub fn stop(&mut self) {
        self.pose(self.full_fframe());
    }

    fn last_frame(&self) -> f64 {
        self.num_frames.saturating_sub(1) as f64
    }

    fn start_range(&mut self, mode: PlayMode, from: f64, to: f64) {
        self.play_mode = mode;
        self.start_time = self.now();
        self.start_frame = from;
        self.play_frames = to - from + 1.0;
        self.from_frame = from.floor() as i64;
        self.to_frame = to.floor() as i64;
        self.paused_f = 0.0;
    }

    fn cycle_range(&mut self, mode: PlayMode, restart: bool, from: f64, to: f64) {
        if from >= to {
            self.pose(from);
            return;
        }
        let fframe = self.full_fframe();
        self.start_range(mode, from, to);
        if !restart {
            if self.paused {
                self.paused_f = fframe - self.start_frame;
            } else {
                self.start_time -= (fframe - self.start_frame) / self.effective_frame_rate;
            }
        }
    }

    /// Frames elapsed since the start of the current mode
    fn get_f(&self) -> f64 {
        if self.paused {
            self.paused_f
        } else {
            (self.now() - self.start_time) * self.effective_frame_rate
        }
    }

    /// Fractional frame number, not wrapped to the animation length
    pub fn full_fframe(&self) -> f64 {
        match self.play_mode {
            PlayMode::Pose => self.start_frame,
            PlayMode::Play => self.get_f().clamp(0.0, self.play_frames) + self.start_frame,
            PlayMode::Loop => cmod(self.get_f(), self.play_frames) + self.start_frame,
            PlayMode::Pingpong => {
                let f = cmod(self.get_f(), self.play_frames * 2.0);
                if f > self.play_frames {
                    (self.play_frames * 2.0 - f) + self.start_frame
                } else {
                    f + self.start_frame
                }
            }
        }
    }

    fn full_frame_offset(&self, increment: i64) -> i64 {
        let mut frame = self.full_fframe().floor() as i64 + increment;
        if self.play_mode == PlayMode::Play {
            frame = frame.clamp(self.from_frame, self.to_frame);
        }
        frame
    }

    /// Integer frame number, not wrapped to the animation length
    pub fn full_frame(&self) -> i64 {
        self.full_frame_offset(0)
    }

    /// Current frame in `0..num_frames`
    pub fn frame(&self) -> usize {
        if self.num_frames == 0 {
            return 0;
        }
        imod(self.full_frame(), self.num_frames as i64) as usize
    }

    /// The frame after the current one, for interpolation
    pub fn next_frame(&self) -> usize {
        if self.num_frames == 0 {
            return 0;
        }
        imod(self.full_frame_offset(1), self.num_frames as i64) as usize
    }

    /// Fraction of the way from `frame()` to `next_frame()`
    pub fn frac(&self) -> f64 {
        let fframe = self.full_fframe();
        fframe - fframe.floor()
    }

    pub fn is_playing(&self) -> bool {
        match self.play_mode {
            PlayMode::Pose => false,
            PlayMode::Play => self.get_f() < self.play_frames,
            PlayMode::Loop | PlayMode::Pingpong => true,
        }
    }
}

impl fmt::Debug for AnimInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimInterface")
            .field("num_frames", &self.num_frames)
            .field("frame_rate", &self.frame_rate)
            .field("play_rate", &self.play_rate)
            .field("play_mode", &self.play_mode)
            .field("frame", &self.frame())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface(fps: f64, frames: usize) -> (AnimClock, AnimInterface) {
        let clock = AnimClock::manual();
        let anim = AnimInterface::new(clock.clone(), fps, frames);
        (clock, anim)
    }

    #[test]
    fn test_pose_holds() {
        let (clock, mut anim) = interface(10.0, 20);
        anim.pose(5.0);
        clock.advance(3.0);
        assert_eq!(anim.frame(), 5);
        assert!(!anim.is_playing());
    }

    #[test]
    fn test_play_clamps_at_end() {
        let (clock, mut anim) = interface(10.0, 20);
        anim.play();
        clock.advance(0.55);
        assert_eq!(anim.frame(), 5);
        assert!((anim.frac() - 0.5).abs() < 1e-9);
        assert!(anim.is_playing());

        clock.advance(10.0);
        assert_eq!(anim.frame(), 19);
        assert_eq!(anim.next_frame(), 19);
        assert!(!anim.is_playing());
    }

    #[test]
    fn test_loop_wraps() {
        let (clock, mut anim) = interface(10.0, 10);
        anim.loop_anim(true);
        clock.advance(1.25);
        assert_eq!(anim.frame(), 2);
        assert_eq!(anim.next_frame(), 3);
        clock.advance(0.7);
        assert_eq!(anim.frame(), 9);
        assert_eq!(anim.next_frame(), 0);
    }

    #[test]
    fn test_loop_without_restart_keeps_frame() {
        let (clock, mut anim) = interface(8.0, 10);
        anim.pose(4.0);
        clock.advance(2.0);
        anim.loop_anim(false);
        assert_eq!(anim.frame(), 4);
        clock.advance(0.125);
        assert_eq!(anim.frame(), 5);
    }

    #[test]
    fn test_pingpong_reflects() {
        let (clock, mut anim) = interface(1.0, 5);
        anim.pingpong(true);
        clock.advance(3.0);
        assert_eq!(anim.frame(), 3);
        clock.advance(4.0);
        // f = 7 of a 10 frame cycle: 10 - 7
        assert_eq!(anim.frame(), 3);
        clock.advance(1.5);
        assert_eq!(anim.frame(), 1);
    }

    #[test]
    fn test_rate_change_keeps_frame() {
        let (clock, mut anim) = interface(10.0, 100);
        anim.loop_anim(true);
        clock.advance(1.0);
        assert_eq!(anim.frame(), 10);

        anim.set_play_rate(2.0);
        assert_eq!(anim.frame(), 10);
        clock.advance(1.0);
        assert_eq!(anim.frame(), 30);

        anim.set_play_rate(0.0);
        clock.advance(5.0);
        assert_eq!(anim.frame(), 30);
        assert_eq!(anim.frame_rate(), 0.0);
    }

    #[test]
    fn test_stop_freezes_current_frame() {
        let (clock, mut anim) = interface(10.0, 100);
        anim.loop_anim(true);
        clock.advance(0.42);
        anim.stop();
        clock.advance(1.0);
        assert_eq!(anim.frame(), 4);
        assert_eq!(anim.play_mode(), PlayMode::Pose);
    }

    #[test]
    fn test_degenerate_range_poses() {
        let (_clock, mut anim) = interface(10.0, 10);
        anim.play_range(6.0, 6.0);
        assert_eq!(anim.play_mode(), PlayMode::Pose);
        assert_eq!(anim.frame(), 6);
    }
}
