//! Pool sizes of the pool-constrained port.

/// Capacity of every arena, fixed when [`PoolSys`](crate::PoolSys) is built.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Thread control blocks.
    pub tcb_count: usize,
    /// Thread stacks.
    pub stack_count: usize,
    /// Words per stack; the largest stack a thread may request.
    pub stack_words_max: usize,
    pub mbox_count: usize,
    /// Largest mailbox capacity, in messages.
    pub mbox_capacity_max: usize,
    pub sem_count: usize,
    pub mutex_count: usize,
    /// Most urgent native priorities kept for the kernel's own tasks.
    pub reserved_high: u8,
    /// Least urgent native priorities kept for the idle and statistics tasks.
    pub reserved_low: u8,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            tcb_count: 8,
            stack_count: 8,
            stack_words_max: 1024,
            mbox_count: 16,
            mbox_capacity_max: 64,
            sem_count: 32,
            mutex_count: 16,
            reserved_high: 2,
            reserved_low: 2,
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Sets the number of thread control blocks and stacks together.
    pub fn threads(mut self, count: usize) -> Self {
        self.config.tcb_count = count;
        self.config.stack_count = count;
        self
    }

    pub fn tcb_count(mut self, count: usize) -> Self {
        self.config.tcb_count = count;
        self
    }

    pub fn stack_count(mut self, count: usize) -> Self {
        self.config.stack_count = count;
        self
    }

    pub fn stack_words_max(mut self, words: usize) -> Self {
        self.config.stack_words_max = words;
        self
    }

    pub fn mbox_count(mut self, count: usize) -> Self {
        self.config.mbox_count = count;
        self
    }

    pub fn mbox_capacity_max(mut self, capacity: usize) -> Self {
        self.config.mbox_capacity_max = capacity;
        self
    }

    pub fn sem_count(mut self, count: usize) -> Self {
        self.config.sem_count = count;
        self
    }

    pub fn mutex_count(mut self, count: usize) -> Self {
        self.config.mutex_count = count;
        self
    }

    /// Sets how many native priorities are kept at each end of the range.
    pub fn reserved_priorities(mut self, high: u8, low: u8) -> Self {
        self.config.reserved_high = high;
        self.config.reserved_low = low;
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}
