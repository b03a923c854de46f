use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tokio_rakudp::{Priority, ReceivedMessage, Reliability, Session, SessionConfig};

const STEP: Duration = Duration::from_millis(10);

/// One direction of a bad network: drops, duplicates and reorders frames.
struct Link {
    rng: u64,
    drop_percent: u64,
    dup_percent: u64,
    in_flight: Vec<(Instant, Bytes)>,
}

impl Link {
    fn new(seed: u64, drop_percent: u64, dup_percent: u64) -> Self {
        Self {
            rng: seed,
            drop_percent,
            dup_percent,
            in_flight: Vec::new(),
        }
    }

    fn roll(&mut self, below: u64) -> u64 {
        // xorshift64
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        self.rng % below
    }

    fn push(&mut self, frame: Bytes, now: Instant) {
        if self.roll(100) < self.drop_percent {
            return;
        }
        let copies = if self.roll(100) < self.dup_percent { 2 } else { 1 };
        for _ in 0..copies {
            let delay = Duration::from_millis(self.roll(60));
            self.in_flight.push((now + delay, frame.clone()));
        }
    }

    fn due(&mut self, now: Instant) -> Vec<Bytes> {
        let (ready, later): (Vec<_>, Vec<_>) =
            self.in_flight.drain(..).partition(|(at, _)| *at <= now);
        self.in_flight = later;
        ready.into_iter().map(|(_, frame)| frame).collect()
    }
}

fn config() -> SessionConfig {
    SessionConfig::new()
        .resend_delay(Duration::from_millis(200))
        .connection_timeout(Duration::from_secs(120))
}

fn tagged(tag: u8, index: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(tag);
    buf.put_u32(index);
    buf.freeze()
}

fn index_of(msg: &ReceivedMessage) -> u32 {
    u32::from_be_bytes([msg.payload[1], msg.payload[2], msg.payload[3], msg.payload[4]])
}

/// Runs both sessions over the links until `done` holds or virtual time runs out.
fn pump(
    a: &mut Session,
    b: &mut Session,
    ab: &mut Link,
    ba: &mut Link,
    start: Instant,
    mut on_b: impl FnMut(ReceivedMessage),
    mut done: impl FnMut(&Session) -> bool,
) -> bool {
    let mut now = start;
    for _ in 0..60_000 {
        now += STEP;
        for frame in a.update(now) {
            ab.push(frame, now);
        }
        for frame in b.update(now) {
            ba.push(frame, now);
        }
        for frame in ab.due(now) {
            let _ = b.handle_datagram(frame, now);
        }
        for frame in ba.due(now) {
            let _ = a.handle_datagram(frame, now);
        }
        while let Some(msg) = b.receive() {
            on_b(msg);
        }
        if done(a) {
            return true;
        }
    }
    false
}

#[test]
fn reliable_traffic_survives_a_bad_link() {
    let start = Instant::now();
    let mut a = Session::new(config(), start);
    let mut b = Session::new(config(), start);
    let mut ab = Link::new(0x9E37_79B9_7F4A_7C15, 25, 10);
    let mut ba = Link::new(0xD1B5_4A32_D192_ED03, 25, 10);

    const ORDERED: u32 = 150;
    const UNORDERED: u32 = 50;
    let big: Bytes = (0..20_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>().into();

    for i in 0..ORDERED {
        a.send(tagged(0, i), Priority::Medium, Reliability::ReliableOrdered, 0)
            .unwrap();
        if i < UNORDERED {
            a.send(tagged(1, i), Priority::High, Reliability::Reliable, 0)
                .unwrap();
        }
    }
    a.send(big.clone(), Priority::Low, Reliability::ReliableOrdered, 2)
        .unwrap();

    let mut ordered = Vec::new();
    let mut unordered = Vec::new();
    let mut bigs = Vec::new();
    let finished = pump(
        &mut a,
        &mut b,
        &mut ab,
        &mut ba,
        start,
        |msg| match msg.channel {
            2 => bigs.push(msg.payload),
            _ if msg.payload[0] == 0 => ordered.push(index_of(&msg)),
            _ => unordered.push(index_of(&msg)),
        },
        |a| {
            let stats = a.statistics();
            stats.resend_queue_len == 0 && stats.send_buffer.iter().all(|&n| n == 0)
        },
    );
    assert!(finished, "link never drained");

    assert_eq!(ordered, (0..ORDERED).collect::<Vec<_>>());
    let distinct: BTreeSet<u32> = unordered.iter().copied().collect();
    assert_eq!(unordered.len(), UNORDERED as usize, "no duplicates");
    assert_eq!(distinct, (0..UNORDERED).collect::<BTreeSet<u32>>());
    assert_eq!(bigs, vec![big]);

    let stats = a.statistics();
    assert!(stats.messages_resent > 0);
    assert!(stats.resend_ratio() > 0.0);
    assert!(stats.split_messages_sent == 1);
    assert!(!a.is_dead() && !b.is_dead());
}

#[test]
fn sequenced_traffic_only_moves_forward() {
    let start = Instant::now();
    let mut a = Session::new(config(), start);
    let mut b = Session::new(config(), start);
    let mut ab = Link::new(42, 30, 20);

    // one state update per tick, like a game loop
    let mut seen = Vec::new();
    let mut now = start;
    for i in 0..400u32 {
        now += STEP;
        if i < 300 {
            a.send(tagged(0, i), Priority::Medium, Reliability::UnreliableSequenced, 5)
                .unwrap();
        }
        for frame in a.update(now) {
            ab.push(frame, now);
        }
        for frame in ab.due(now) {
            let _ = b.handle_datagram(frame, now);
        }
        while let Some(msg) = b.receive() {
            assert_eq!(msg.channel, 5);
            seen.push(index_of(&msg));
        }
    }

    assert!(seen.len() > 30);
    assert!(seen.len() < 300, "some should have been lost");
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "went backwards: {seen:?}");
    assert!(b.statistics().duplicate_messages_received > 0);
}

#[test]
fn silent_peer_times_out() {
    let start = Instant::now();
    let cfg = SessionConfig::new()
        .resend_delay(Duration::from_millis(200))
        .connection_timeout(Duration::from_secs(2));
    let mut a = Session::new(cfg, start);
    a.send(tagged(0, 0), Priority::Medium, Reliability::Reliable, 0)
        .unwrap();

    let mut now = start;
    while !a.is_dead() && now < start + Duration::from_secs(10) {
        now += STEP;
        a.update(now);
    }
    assert!(a.is_dead());
    assert!(now - start > Duration::from_secs(2));
    assert!(a.update(now).is_empty());
}
