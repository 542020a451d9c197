//! Playback range of an opened stream.

/// Stream bounds and the trimmed range played between mark-in and mark-out.
///
/// Setters keep `begin <= mark_in < mark_out <= end` with at least one frame
/// between the marks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marks {
    begin: f64,
    end: f64,
    frame_duration: f64,
    mark_in: f64,
    mark_out: f64,
}

/// `value` bounded to `[min, max]`; `max` wins when the bounds cross.
fn bound(min: f64, value: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

impl Marks {
    /// Range covering the whole stream.
    pub fn new(begin: f64, end: f64, frame_duration: f64) -> Self {
        Self::with_marks(begin, end, frame_duration, None, None)
    }

    pub fn with_marks(
        begin: f64,
        end: f64,
        frame_duration: f64,
        mark_in: Option<f64>,
        mark_out: Option<f64>,
    ) -> Self {
        let mut marks = Self {
            begin,
            end,
            frame_duration,
            mark_in: begin,
            mark_out: end,
        };
        marks.mark_out = bound(begin + frame_duration, mark_out.unwrap_or(end), end);
        marks.mark_in = bound(begin, mark_in.unwrap_or(begin), marks.mark_out - frame_duration);
        marks
    }

    pub fn begin(&self) -> f64 {
        self.begin
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.begin
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    pub fn mark_in(&self) -> f64 {
        self.mark_in
    }

    pub fn mark_out(&self) -> f64 {
        self.mark_out
    }

    /// Returns the mark actually applied.
    pub fn set_mark_in(&mut self, time: f64) -> f64 {
        self.mark_in = bound(self.begin, time, self.mark_out - self.frame_duration);
        self.mark_in
    }

    /// Returns the mark actually applied.
    pub fn set_mark_out(&mut self, time: f64) -> f64 {
        self.mark_out = bound(self.mark_in + self.frame_duration, time, self.end);
        self.mark_out
    }

    pub fn clamp_to_stream(&self, time: f64) -> f64 {
        bound(self.begin, time, self.end)
    }

    pub fn clamp_to_marks(&self, time: f64) -> f64 {
        bound(self.mark_in, time, self.mark_out)
    }

    /// `time` folded back into the marks as if playback looped.
    pub fn wrap(&self, time: f64) -> f64 {
        if time > self.mark_out {
            self.mark_in + (time - self.mark_out)
        } else if time < self.mark_in {
            self.mark_out - (self.mark_in - time)
        } else {
            time
        }
    }

    /// Whether `time` lies within one frame of mark-in.
    pub fn is_at_mark_in(&self, time: f64) -> bool {
        (time - self.mark_in).abs() < self.frame_duration
    }
}
