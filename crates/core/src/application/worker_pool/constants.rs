// Worker pool constants

/// Capacity of the pool event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Queue depth per worker above which the pool may grow (depth > N x workers)
pub const GROW_QUEUE_FACTOR: usize = 2;

/// Workers added or removed per scaling evaluation
pub const SCALE_STEP: usize = 1;
