use std::time::Duration;

/// Host-activity probe: answers "has the user been idle for at least the
/// threshold, and is audio currently playing".
///
/// Implementations must be cheap and non-blocking; the scheduler consults
/// them every second on the loop task.
pub trait ActivityProbe: Send {
    /// Seconds since the last user input, or `None` when the platform
    /// signal is unavailable.
    fn idle_seconds(&self) -> Option<u64>;

    /// True while any audio session is actively rendering.
    fn is_audio_playing(&self) -> bool;

    /// Idle classification with the audio exemption applied: active audio
    /// suppresses the idle verdict regardless of input idle time, and
    /// missing platform data degrades to "not idle" rather than erroring.
    fn is_user_idle(&self, threshold: Duration) -> bool {
        let Some(idle_secs) = self.idle_seconds() else {
            return false;
        };
        if Duration::from_secs(idle_secs) < threshold {
            return false;
        }
        !self.is_audio_playing()
    }
}

/// Probe for platforms without idle/audio detection: always active, so idle
/// mode becomes a no-op instead of a crash.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverIdle;

impl ActivityProbe for NeverIdle {
    fn idle_seconds(&self) -> Option<u64> {
        None
    }

    fn is_audio_playing(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProbe {
        idle: Option<u64>,
        audio: bool,
    }

    impl ActivityProbe for FakeProbe {
        fn idle_seconds(&self) -> Option<u64> {
            self.idle
        }
        fn is_audio_playing(&self) -> bool {
            self.audio
        }
    }

    const THRESHOLD: Duration = Duration::from_secs(60);

    #[test]
    fn below_threshold_is_active() {
        let p = FakeProbe { idle: Some(30), audio: false };
        assert!(!p.is_user_idle(THRESHOLD));
    }

    #[test]
    fn at_threshold_is_idle() {
        let p = FakeProbe { idle: Some(60), audio: false };
        assert!(p.is_user_idle(THRESHOLD));
    }

    #[test]
    fn audio_overrides_idle_time() {
        let p = FakeProbe { idle: Some(3600), audio: true };
        assert!(!p.is_user_idle(THRESHOLD));
    }

    #[test]
    fn missing_signal_degrades_to_active() {
        let p = FakeProbe { idle: None, audio: false };
        assert!(!p.is_user_idle(THRESHOLD));
    }

    #[test]
    fn never_idle_stub() {
        assert!(!NeverIdle.is_user_idle(Duration::from_secs(0)));
    }
}
