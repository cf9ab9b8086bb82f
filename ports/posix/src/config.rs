//! Table sizes and limits of the POSIX port.

/// Capacity limits fixed when the port is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PosixConfig {
    /// Entries in the mailbox table.
    pub mbox_max: usize,
    /// Largest mailbox capacity, in messages.
    pub mbox_size: usize,
    /// Kernel semaphores available to the layer. Each mailbox uses two,
    /// each semaphore and mutex one.
    pub sem_max: usize,
    /// Entries in the thread table.
    pub thread_max: usize,
    /// Largest stack a caller may request, in bytes.
    pub stack_size_max: usize,
    /// Smallest stack handed to a host thread, in bytes.
    pub host_stack_min: usize,
    /// Rate of the tick counter behind `now_ms`.
    pub tick_rate_hz: u32,
}

impl Default for PosixConfig {
    fn default() -> Self {
        Self {
            mbox_max: 32,
            mbox_size: 500,
            sem_max: 64,
            thread_max: 16,
            stack_size_max: 1 << 20,
            host_stack_min: 64 * 1024,
            tick_rate_hz: 1000,
        }
    }
}

impl PosixConfig {
    pub fn builder() -> PosixConfigBuilder {
        PosixConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PosixConfigBuilder {
    config: PosixConfig,
}

impl PosixConfigBuilder {
    pub fn mbox_max(mut self, max: usize) -> Self {
        self.config.mbox_max = max;
        self
    }

    pub fn mbox_size(mut self, size: usize) -> Self {
        self.config.mbox_size = size;
        self
    }

    pub fn sem_max(mut self, max: usize) -> Self {
        self.config.sem_max = max;
        self
    }

    pub fn thread_max(mut self, max: usize) -> Self {
        self.config.thread_max = max;
        self
    }

    /// Sets the largest stack a caller may request, in bytes.
    pub fn stack_size_max(mut self, bytes: usize) -> Self {
        self.config.stack_size_max = bytes;
        self
    }

    pub fn host_stack_min(mut self, bytes: usize) -> Self {
        self.config.host_stack_min = bytes;
        self
    }

    pub fn tick_rate_hz(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    pub fn build(self) -> PosixConfig {
        self.config
    }
}
