//! SWP 시뮬레이션 - Sliding Window Protocol
//!
//! 손실/변조 링크로 연결된 두 스테이션이 양방향으로 패킷을 교환한다.
//! selective repeat + NAK + piggyback ACK 동작을 한 프로세스 안에서 재현.
//!
//! 사용법:
//!   cargo run --release --bin swp-sim -- [OPTIONS]
//!
//! 예시:
//!   # 기본: 32개 패킷, 10% 손실 + 5% 변조
//!   cargo run --release --bin swp-sim
//!
//!   # 무손실 링크로 100개
//!   cargo run --release --bin swp-sim -- -n 100 --loss 0 --corrupt 0

use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::time::timeout;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use swp::link::LinkPort;
use swp::{Config, DeliveredReceiver, Engine};

/// 시뮬레이션 설정
struct SimConfig {
    count: usize,
    config: Config,
}

impl Default for SimConfig {
    fn default() -> Self {
        let mut config = Config::lossy();
        config.data_timeout_ms = 40;
        config.ack_timeout_ms = 20;
        Self { count: 32, config }
    }
}

fn parse_args() -> SimConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut sim = SimConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-n" => {
                if i + 1 < args.len() {
                    sim.count = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--loss" => {
                if i + 1 < args.len() {
                    sim.config.loss_rate = args[i + 1].parse().expect("유효한 비율 필요");
                    i += 1;
                }
            }
            "--corrupt" => {
                if i + 1 < args.len() {
                    sim.config.corrupt_rate = args[i + 1].parse().expect("유효한 비율 필요");
                    i += 1;
                }
            }
            "--data-timeout" => {
                if i + 1 < args.len() {
                    sim.config.data_timeout_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--ack-timeout" => {
                if i + 1 < args.len() {
                    sim.config.ack_timeout_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"SWP Simulator - Sliding Window Protocol 시뮬레이터

손실/변조 링크 위에서 selective repeat ARQ 두 스테이션을 돌린다.

사용법:
  cargo run --release --bin swp-sim -- [OPTIONS]

옵션:
  -n, --count <N>         스테이션당 전송 패킷 수 (기본: 32)
  --loss <RATIO>          프레임 손실률 0.0~1.0 (기본: 0.10)
  --corrupt <RATIO>       프레임 변조율 0.0~1.0 (기본: 0.05)
  --data-timeout <MS>     DATA 재전송 타임아웃 밀리초 (기본: 40)
  --ack-timeout <MS>      지연 ACK 타임아웃 밀리초 (기본: 20)
  -h, --help              이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    sim
}

/// 전달 채널에서 count개를 순서 검증하며 수신
async fn drain(mut rx: DeliveredReceiver, prefix: &str, count: usize) -> usize {
    let mut received = 0usize;
    while received < count {
        match timeout(Duration::from_secs(30), rx.recv()).await {
            Ok(Some(packet)) => {
                let expected = format!("{prefix} #{received}");
                assert_eq!(
                    packet.as_ref(),
                    expected.as_bytes(),
                    "순서/내용 불일치"
                );
                received += 1;
            }
            Ok(None) => break,
            Err(_) => {
                info!("{}: {}개 수신 후 타임아웃", prefix, received);
                break;
            }
        }
    }
    received
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let sim = parse_args();

    info!("SWP Simulator starting...");
    info!("Packets per station: {}", sim.count);
    info!(
        "Link: loss {:.1}%, corrupt {:.1}%",
        sim.config.loss_rate * 100.0,
        sim.config.corrupt_rate * 100.0
    );
    info!(
        "Timers: data {}ms, ack {}ms",
        sim.config.data_timeout_ms, sim.config.ack_timeout_ms
    );

    // 링크 한 쌍으로 스테이션 둘을 연결
    let (port_a, port_b) = LinkPort::pair(sim.config.link());
    let (a, a_client, a_delivered) = Engine::start(sim.config.clone(), port_a);
    let (b, b_client, b_delivered) = Engine::start(sim.config.clone(), port_b);

    let started = Instant::now();

    // 양방향 제출
    for i in 0..sim.count {
        a_client.submit(Bytes::from(format!("a->b #{i}"))).await?;
        b_client.submit(Bytes::from(format!("b->a #{i}"))).await?;
    }

    // 양쪽 전달 완료 대기
    let count = sim.count;
    let b_side = tokio::spawn(async move { drain(b_delivered, "a->b", count).await });
    let a_side = tokio::spawn(async move { drain(a_delivered, "b->a", count).await });

    let at_b = b_side.await?;
    let at_a = a_side.await?;
    let elapsed = started.elapsed();

    info!(
        "전송 완료: a->b {}/{}, b->a {}/{} ({:.2}ms)",
        at_b,
        count,
        at_a,
        count,
        elapsed.as_secs_f64() * 1000.0
    );
    info!("Station A stats: {}", a.stats().summary());
    info!("Station B stats: {}", b.stats().summary());

    a.stop();
    b.stop();
    a.join().await;
    b.join().await;

    Ok(())
}
