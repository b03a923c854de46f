use std::time::Duration;

/// Default MTU, the typical value for dial-up ISPs and the smallest any IPv4 host must accept.
pub const DEFAULT_MTU_SIZE: usize = 576;
/// Largest UDP datagram this layer will ever build or accept.
pub const MAXIMUM_MTU_SIZE: usize = 8000;

/// IP header plus UDP header, reserved out of every frame.
pub const UDP_HEADER_SIZE: usize = 28;

/// Number of independent ordering channels. The channel is written with 5 bits.
pub const NUMBER_OF_ORDERED_STREAMS: u8 = 32;
pub const ORDERING_CHANNEL_BITS: usize = 5;
pub const RELIABILITY_BITS: usize = 3;

/// Bits used by one acknowledgement entry: a 16 bit sequence number plus the ack flag.
pub const ACK_BIT_LENGTH: usize = 16 + 1;

/// How many reliable packets may be in flight before we wait for acks.
/// Pending acks are also flushed once this many have queued up.
pub const MINIMUM_WINDOW_SIZE: usize = 5;

/// The most ack entries that could ever fit into one frame.
pub const MAXIMUM_WINDOW_SIZE: usize = (MAXIMUM_MTU_SIZE - UDP_HEADER_SIZE) * 8 / ACK_BIT_LENGTH;

/// Window growth above the lossy ceiling that also raises the ceiling.
pub const LOSSY_WINDOW_HEADROOM: usize = 5;

/// A connection with unacknowledged reliable data and no ack for this long is dead.
/// Also the lifetime of entries in the received-packet log.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(10000);

pub const DEFAULT_RESEND_DELAY: Duration = Duration::from_millis(1000);
/// Should be at least one update interval plus one socket poll interval.
pub const MINIMUM_RESEND_DELAY: Duration = Duration::from_millis(150);

/// Uncompleted unreliable split packets are discarded after this long.
pub const UNRELIABLE_SPLIT_EXPIRY: Duration = Duration::from_millis(5000);

/// Upper bound on the number of parts a single message may be split into.
pub const MAXIMUM_SPLIT_PARTS: usize = 1024;

/// Bookkeeping charged per held fragment on top of its payload.
pub const SPLIT_FRAGMENT_OVERHEAD: usize = 64;
/// Upper bound on the bytes a session holds for partially received split messages.
/// Fits one maximum-size message with room to spare.
pub const MAXIMUM_REASSEMBLY_BYTES: usize = 16 * 1024 * 1024;

/// Initial allocation of the received-packet log.
pub const RECEIVED_LOG_CAPACITY: usize = 128;

/// Interval between two update ticks of every session.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);
