//! Progress reporting for long running flash operations.

/// A structure to manage the flashing procedure progress reporting.
///
/// Pass a closure to [`FlashProgress::new`] to receive one
/// [`ProgressEvent`] per state change. The closure is called from the
/// thread the operation runs on.
pub struct FlashProgress {
    handler: Box<dyn Fn(ProgressEvent)>,
}

impl FlashProgress {
    /// Creates a new `FlashProgress` structure with a given `handler` to be called on events.
    pub fn new(handler: impl Fn(ProgressEvent) + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Creates a `FlashProgress` that drops all events.
    pub fn empty() -> Self {
        Self {
            handler: Box::new(|_| {}),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        (self.handler)(event);
    }

    pub(crate) fn started_erasing(&self) {
        self.emit(ProgressEvent::StartedErasing);
    }

    pub(crate) fn finished_erasing(&self) {
        self.emit(ProgressEvent::FinishedErasing);
    }

    pub(crate) fn failed_erasing(&self) {
        self.emit(ProgressEvent::FailedErasing);
    }

    pub(crate) fn started_programming(&self, length: u32) {
        self.emit(ProgressEvent::StartedProgramming { length });
    }

    pub(crate) fn row_programmed(&self, address: u32) {
        self.emit(ProgressEvent::RowProgrammed { address });
    }

    pub(crate) fn finished_programming(&self) {
        self.emit(ProgressEvent::FinishedProgramming);
    }

    pub(crate) fn failed_programming(&self) {
        self.emit(ProgressEvent::FailedProgramming);
    }

    pub(crate) fn started_verifying(&self) {
        self.emit(ProgressEvent::StartedVerifying);
    }

    pub(crate) fn page_verified(&self, address: u32) {
        self.emit(ProgressEvent::PageVerified { address });
    }

    pub(crate) fn finished_verifying(&self) {
        self.emit(ProgressEvent::FinishedVerifying);
    }

    pub(crate) fn failed_verifying(&self) {
        self.emit(ProgressEvent::FailedVerifying);
    }

    pub(crate) fn started_reading(&self) {
        self.emit(ProgressEvent::StartedReading);
    }

    pub(crate) fn page_read(&self, address: u32) {
        self.emit(ProgressEvent::PageRead { address });
    }

    pub(crate) fn finished_reading(&self) {
        self.emit(ProgressEvent::FinishedReading);
    }

    pub(crate) fn failed_reading(&self) {
        self.emit(ProgressEvent::FailedReading);
    }
}

/// Possible events during the flashing process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The chip erase has started.
    StartedErasing,
    /// The chip erase has finished.
    FinishedErasing,
    /// The chip erase has failed.
    FailedErasing,
    /// Programming has started.
    StartedProgramming {
        /// The total number of bytes that will be written, including row padding.
        length: u32,
    },
    /// A row was written and committed.
    RowProgrammed {
        /// Start address of the row.
        address: u32,
    },
    /// Programming has finished.
    FinishedProgramming,
    /// Programming has failed.
    FailedProgramming,
    /// Verification has started.
    StartedVerifying,
    /// A page was compared against the image.
    PageVerified {
        /// Start address of the page.
        address: u32,
    },
    /// Verification has finished.
    FinishedVerifying,
    /// Verification has failed.
    FailedVerifying,
    /// Reading flash contents has started.
    StartedReading,
    /// A page was read back.
    PageRead {
        /// Start address of the page.
        address: u32,
    },
    /// Reading has finished.
    FinishedReading,
    /// Reading has failed.
    FailedReading,
}
