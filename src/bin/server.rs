//! SREJ 서버 (송신자)
//!
//! 요청받은 파일을 Selective-Reject 슬라이딩 윈도우로 전송한다.
//! 클라이언트마다 독립 태스크와 소켓을 사용한다.
//!
//! 사용법:
//!   cargo run --release --bin srej-server -- <error-rate> [port] [--seed N]
//!
//! 예시:
//!   # 10% 손실/손상, 임의 포트
//!   cargo run --release --bin srej-server -- 0.1
//!
//!   # 손실 없음, 포트 9000
//!   cargo run --release --bin srej-server -- 0 9000

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use srej::{Config, Server};

const USAGE: &str = r#"SREJ Server - Selective-Reject ARQ 파일 전송 서버

사용법:
  srej-server <error-rate> [port] [OPTIONS]

인자:
  <error-rate>     송신 패킷 손실/손상 확률 (0 이상 1 미만)
  [port]           수신 포트 (기본: 0 = 임의 포트)

옵션:
  --seed <N>       에러 주입 RNG 시드 (재현용)
  -h, --help       이 도움말 출력

로그 레벨은 RUST_LOG로 조정 (기본: info)
"#;

/// 서버 실행 인자
struct ServerArgs {
    port: u16,
    config: Config,
}

fn parse_args() -> Result<ServerArgs, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut positional = Vec::new();
    let mut seed = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" => {
                let value = args.get(i + 1).ok_or("--seed 값 필요")?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("유효한 시드 아님: {}", value))?,
                );
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    if positional.is_empty() || positional.len() > 2 {
        return Err("인자 개수가 맞지 않음".into());
    }

    let error_rate: f64 = positional[0]
        .parse()
        .map_err(|_| format!("유효한 에러율 아님: {}", positional[0]))?;
    let port = match positional.get(1) {
        Some(port) => port
            .parse()
            .map_err(|_| format!("유효한 포트 아님: {}", port))?,
        None => 0,
    };

    let mut config = Config::lossy(error_rate);
    config.seed = seed;
    config.validate().map_err(|e| e.to_string())?;

    Ok(ServerArgs { port, config })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            std::process::exit(1);
        }
    };

    info!("SREJ Server starting...");
    info!("Error rate: {:.1}%", args.config.error_rate * 100.0);
    if let Some(seed) = args.config.seed {
        info!("Seed: {}", seed);
    }

    let server = Server::bind_any(args.config, args.port).await?;
    info!("Server port: {}", server.local_addr()?.port());

    server.run().await?;
    Ok(())
}
