//! Two-process end-to-end test: guest and host roles in separate OS
//! processes, framing packets over one direction of a file-backed region.
//!
//! Uses a self-spawning pattern: the test executable re-invokes itself with
//! an environment variable selecting the role, so producer and consumer run
//! concurrently with genuinely separate address spaces mapping the same
//! file. This is the arrangement the channel is built for — no shared
//! process state, only the region and its index protocol.

use std::env;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use shmchan_mmap::ShmFile;
use shmchan_packet::{OutboundPacket, PacketBody, PacketError, PacketReceiver, PacketSender};
use shmchan_ring::{ChannelError, RingChannel, region_size_for};

const ENV_ROLE: &str = "SHMCHAN_E2E_ROLE";
const ENV_PATH: &str = "SHMCHAN_E2E_PATH";
const ROLE_GUEST: &str = "guest";
const ROLE_HOST: &str = "host";

const PACKETS: u64 = 20_000;
const RING_CAPACITY: usize = 4096;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn payload_for(i: u64) -> Vec<u8> {
    let len = (i % 120 + 8) as usize;
    (0..len).map(|k| (i as u8).wrapping_add(k as u8)).collect()
}

/// Guest role: creates the region and streams framed packets into it.
fn run_guest(path: &str) -> anyhow::Result<()> {
    init_tracing();

    let mut file = ShmFile::create_rw(path, region_size_for(RING_CAPACITY) as u64)
        .context("guest: failed to create region file")?;
    // SAFETY: the mapping is writable, sized by `region_size_for`, and
    // lives until this process exits.
    let chan = unsafe { RingChannel::create(file.as_mut_ptr(), file.len()) }
        .context("guest: failed to create channel")?;
    let mut sender = PacketSender::new(&chan);

    tracing::info!(capacity = RING_CAPACITY, packets = PACKETS, "guest streaming");

    let deadline = Instant::now() + Duration::from_secs(30);
    for i in 0..PACKETS {
        let payload = payload_for(i);
        let pkt = OutboundPacket::data_in_band(i, &payload);
        loop {
            match sender.send(&pkt) {
                Ok(()) => break,
                Err(PacketError::Channel(ChannelError::InsufficientSpace { .. })) => {
                    if Instant::now() > deadline {
                        bail!("guest: host stopped draining at packet {i}");
                    }
                    std::hint::spin_loop();
                }
                Err(e) => return Err(e).context("guest: send failed"),
            }
        }
    }

    tracing::info!("guest done");
    Ok(())
}

/// Host role: attaches to the live region and drains it.
fn run_host(path: &str) -> anyhow::Result<()> {
    init_tracing();

    // The guest creates the file; retry until it shows up.
    let open_deadline = Instant::now() + Duration::from_secs(5);
    let mut file = loop {
        match ShmFile::open_rw(path) {
            Ok(f) if f.len() >= region_size_for(RING_CAPACITY) => break f,
            Ok(_) | Err(_) if Instant::now() < open_deadline => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(_) => bail!("host: region file has the wrong size"),
            Err(e) => return Err(e).context("host: failed to open region file"),
        }
    };

    // SAFETY: same mapping contract as the guest side; attach leaves the
    // live indices untouched.
    let chan = unsafe { RingChannel::attach(file.as_mut_ptr(), file.len()) }
        .context("host: failed to attach channel")?;
    let receiver = PacketReceiver::new(&chan);

    chan.set_interrupt_mask(true); // polling consumer, no doorbell wanted

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut received = 0u64;
    while received < PACKETS {
        match receiver.try_recv().context("host: recv failed")? {
            Some(pkt) => {
                let expected = payload_for(received);
                if pkt.descriptor().transaction_id != received {
                    bail!(
                        "host: expected transaction {received}, got {}",
                        pkt.descriptor().transaction_id
                    );
                }
                match pkt.body().context("host: body decode failed")? {
                    PacketBody::Simple { payload } => {
                        // Declared spans are padded to 8 bytes; compare the
                        // exact prefix.
                        if &payload[..expected.len()] != expected.as_slice() {
                            bail!("host: corrupt payload at packet {received}");
                        }
                    }
                    other => bail!("host: unexpected body {other:?}"),
                }
                received += 1;
            }
            None => {
                if Instant::now() > deadline {
                    bail!("host: timed out after {received} packets");
                }
                std::hint::spin_loop();
            }
        }
    }

    tracing::info!(received, "host done");
    Ok(())
}

#[test]
fn e2e_two_process_packet_stream() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let path = env::var(ENV_PATH).expect("role set but path missing");
        let result = match role.as_str() {
            ROLE_GUEST => run_guest(&path),
            ROLE_HOST => run_host(&path),
            other => panic!("unknown role: {other}"),
        };
        result.expect("child role failed");
        return;
    }

    let path = format!("/tmp/shmchan_e2e_{}", std::process::id());
    let exe = env::current_exe().expect("failed to get current executable");

    let mut guest = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_packet_stream")
        .env(ENV_ROLE, ROLE_GUEST)
        .env(ENV_PATH, &path)
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn guest process");

    // The host retries opening the file, so a token head start suffices.
    std::thread::sleep(Duration::from_millis(5));

    let mut host = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_packet_stream")
        .env(ENV_ROLE, ROLE_HOST)
        .env(ENV_PATH, &path)
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn host process");

    let guest_status = guest.wait().expect("failed to wait for guest");
    let host_status = host.wait().expect("failed to wait for host");

    let _ = std::fs::remove_file(&path);

    assert!(guest_status.success(), "guest failed: {guest_status}");
    assert!(host_status.success(), "host failed: {host_status}");
}
