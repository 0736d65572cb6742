mod common;

use common::{device_nodes, test_config, FakeModem};
use smsrelay::modem::discovery::{discover, probe, Candidates, Discovered, ProbeTiming, Role};
use smsrelay::modem::{Endpoint, ModemDriver, ModemError};

fn timing() -> ProbeTiming {
    ProbeTiming {
        settle: std::time::Duration::ZERO,
        response: std::time::Duration::ZERO,
        io_timeout: std::time::Duration::from_millis(50),
    }
}

fn fixed(paths: &[&str]) -> Candidates {
    Candidates::Fixed(paths.iter().map(|p| p.to_string()).collect())
}

#[tokio::test]
async fn probe_requires_ok() {
    let modem = FakeModem::with_ports(&["/dev/ttyUSB0".to_string()]);
    let endpoint = Endpoint::new("/dev/ttyUSB0", 115200);
    assert!(probe(&modem, &endpoint, &timing()).await);
    assert!(!modem.is_busy("/dev/ttyUSB0"));

    modem.state().responsive.clear();
    assert!(!probe(&modem, &endpoint, &timing()).await);
    assert!(!probe(&modem, &Endpoint::new("/dev/ttyUSB9", 115200), &timing()).await);
}

#[tokio::test]
async fn command_role_takes_first_live_candidate() {
    let modem = FakeModem::with_ports(&["/dev/ttyUSB2".into(), "/dev/ttyUSB3".into()]);
    let found = discover(&modem, &fixed(&["/dev/ttyUSB2", "/dev/ttyUSB3"]), 115200, Role::Command, &timing())
        .await
        .unwrap();
    assert_eq!(found, Discovered::Live(Endpoint::new("/dev/ttyUSB2", 115200)));
}

#[tokio::test]
async fn monitor_role_prefers_last_enumerated() {
    let modem = FakeModem::with_ports(&["/dev/ttyUSB0".into(), "/dev/ttyUSB1".into()]);
    let found = discover(&modem, &fixed(&["/dev/ttyUSB0", "/dev/ttyUSB1"]), 115200, Role::Monitor, &timing())
        .await
        .unwrap();
    assert!(found.is_live());
    assert_eq!(found.endpoint().path, "/dev/ttyUSB1");
}

#[tokio::test]
async fn monitor_avoids_port_held_by_driver() {
    let (dir, ports) = device_nodes(2);
    let modem = FakeModem::with_ports(&ports);
    let config = test_config(dir.path(), &ports);

    // Driver holds the first candidate
    let mut driver = ModemDriver::new(config.modem.clone(), modem.opener());
    driver.connect().await.unwrap();
    assert_eq!(driver.endpoint().map(|e| e.path.clone()), Some(ports[0].clone()));

    // Even with the monitor probing the held port first it must land on the other one
    let reversed = Candidates::Fixed(vec![ports[1].clone(), ports[0].clone()]);
    let found = discover(&modem, &reversed, 115200, Role::Monitor, &timing()).await.unwrap();
    assert_eq!(found, Discovered::Live(Endpoint::new(ports[1].clone(), 115200)));

    let pattern = Candidates::Pattern(config.modem.device_pattern.clone());
    let found = discover(&modem, &pattern, 115200, Role::Monitor, &timing()).await.unwrap();
    assert_eq!(found.endpoint().path, ports[1]);
    assert!(modem.is_busy(&ports[0]));
}

#[tokio::test]
async fn silent_candidates_fall_back_to_last_enumerated() {
    let modem = FakeModem::with_ports(&["/dev/ttyUSB0".into(), "/dev/ttyUSB1".into()]);
    modem.state().responsive.clear();
    for role in [Role::Command, Role::Monitor] {
        let found = discover(&modem, &fixed(&["/dev/ttyUSB0", "/dev/ttyUSB1"]), 9600, role, &timing())
            .await
            .unwrap();
        assert_eq!(found, Discovered::Fallback(Endpoint::new("/dev/ttyUSB1", 9600)));
    }
}

#[tokio::test]
async fn no_candidates_is_no_device_found() {
    let modem = FakeModem::default();
    let err = discover(&modem, &fixed(&[]), 115200, Role::Monitor, &timing())
        .await
        .unwrap_err();
    assert!(matches!(err, ModemError::NoDeviceFound(_)));

    let err = discover(
        &modem,
        &Candidates::Pattern("/nonexistent-smsrelay/ttyUSB*".into()),
        115200,
        Role::Monitor,
        &timing(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("/nonexistent-smsrelay/ttyUSB*"));
}
