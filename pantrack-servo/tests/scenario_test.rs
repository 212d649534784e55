//! Whole-loop behavior over synthetic frames

use image::{Rgb, RgbImage};
use mockall::mock;
use pantrack_core::{ActuatorLimits, DetectionResult, ServoConfig, TelemetryFormat};
use pantrack_eye::ReplaySource;
use pantrack_servo::{
    open_sink, ActuatorTransport, CommandGate, ControlLaw, ControlState, DryRunTransport, Headless,
    LineTransport, MemorySink, ServoError, ServoLoop, ServoPipeline, StaticConfig,
};
use std::time::{Duration, Instant};

mock! {
    Link {}

    impl ActuatorTransport for Link {
        fn name(&self) -> &str;
        fn send_angle(&mut self, angle: i32) -> Result<(), ServoError>;
    }
}

const GREY: Rgb<u8> = Rgb([90, 90, 90]);

fn blank() -> RgbImage {
    RgbImage::from_pixel(320, 240, GREY)
}

fn with_disc(cx: i64, r: i64) -> RgbImage {
    RgbImage::from_fn(320, 240, |x, y| {
        let dx = x as i64 - cx;
        let dy = y as i64 - 120;
        if dx * dx + dy * dy <= r * r {
            Rgb([30, 200, 40])
        } else {
            GREY
        }
    })
}

#[test]
fn test_small_blob_is_ignored_even_with_zero_min_area() {
    let mut config = ServoConfig::default();
    config.threshold.min_area = 0;
    let mut pipeline = ServoPipeline::new(&config);
    let mut transport = DryRunTransport::new();

    // A 3x3 target survives neither the blur nor the hard floor.
    let mut frame = blank();
    for y in 100..103 {
        for x in 250..253 {
            frame.put_pixel(x, y, Rgb([30, 200, 40]));
        }
    }
    let snapshot = pipeline.tick(&frame, &config, &mut transport, Instant::now());
    assert!(!snapshot.target_found());
    assert_eq!(snapshot.smoothed_angle, 90.0);
}

#[test]
fn test_lost_target_holds_last_angle() {
    let config = ServoConfig::default();
    let mut pipeline = ServoPipeline::new(&config);
    let mut transport = DryRunTransport::new();
    let mut now = Instant::now();

    for _ in 0..5 {
        pipeline.tick(&with_disc(260, 30), &config, &mut transport, now);
        now += Duration::from_millis(100);
    }
    let held = *pipeline.control_state();
    assert!(held.smoothed_angle < 90.0);
    let sent_before = transport.sent().len();

    for _ in 0..10 {
        let snapshot = pipeline.tick(&blank(), &config, &mut transport, now);
        assert!(!snapshot.target_found());
        assert_eq!(snapshot.smoothed_angle, held.smoothed_angle);
        now += Duration::from_millis(100);
    }
    assert_eq!(*pipeline.control_state(), held);
    assert_eq!(transport.sent().len(), sent_before);
}

#[test]
fn test_centered_target_inside_deadband() {
    let config = ServoConfig::default();
    let mut pipeline = ServoPipeline::new(&config);
    let mut transport = DryRunTransport::new();
    let snapshot = pipeline.tick(&with_disc(160, 30), &config, &mut transport, Instant::now());
    assert!(snapshot.target_found());
    assert!(snapshot.angle_x_deg.abs() <= config.control.deadband_degrees);
    assert_eq!(snapshot.raw_angle, 90.0);
}

#[test]
fn test_failed_writes_are_retried_next_tick() {
    let config = ServoConfig::default();
    let mut pipeline = ServoPipeline::new(&config);

    let mut link = MockLink::new();
    link.expect_name().return_const("flaky".to_string());
    let mut seq = mockall::Sequence::new();
    link.expect_send_angle()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(ServoError::Transport("timeout".to_string())));
    link.expect_send_angle()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let t0 = Instant::now();
    let first = pipeline.tick(&blank(), &config, &mut link, t0);
    assert_eq!(first.command_sent, None);
    assert_eq!(pipeline.gate_state().last_sent_angle, None);

    let second = pipeline.tick(&blank(), &config, &mut link, t0 + Duration::from_millis(1));
    assert_eq!(second.command_sent, Some(90));
    assert_eq!(pipeline.gate_state().last_sent_angle, Some(90));
}

#[test]
fn test_line_transport_sees_wire_format() {
    let config = ServoConfig::default();
    let mut pipeline = ServoPipeline::new(&config);
    let mut transport = LineTransport::new(Vec::new(), "buffer");
    let mut now = Instant::now();
    for _ in 0..3 {
        pipeline.tick(&with_disc(290, 25), &config, &mut transport, now);
        now += Duration::from_millis(60);
    }
    let wire = String::from_utf8(transport.get_ref().clone()).unwrap();
    assert!(wire.ends_with('\n'));
    let values: Vec<i32> = wire.lines().map(|l| l.parse().unwrap()).collect();
    assert_eq!(values.len(), 3);
    assert!(values[0] < 90);
    assert!(values.windows(2).all(|w| w[1] < w[0]));
    assert!(values.iter().all(|v| (0..=180).contains(v)));
}

#[test]
fn test_loop_writes_csv_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServoConfig::default();
    config.telemetry.directory = dir.path().to_path_buf();
    config.telemetry.format = TelemetryFormat::Csv;

    let frames = vec![blank(), with_disc(260, 30), with_disc(260, 30)];
    let mut servo = ServoLoop::new(
        ReplaySource::from_frames(frames),
        DryRunTransport::new(),
        open_sink(&config.telemetry).unwrap(),
        &config,
    );
    let summary = servo
        .run(&mut StaticConfig(config.clone()), &mut Headless)
        .unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.detections, 2);

    let log = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().starts_with("tracking_log_"))
        .expect("log file");
    let text = std::fs::read_to_string(log.path()).unwrap();
    let rows: Vec<&str> = text.lines().collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[0].starts_with("timestamp_iso,target_found,"));
    assert_eq!(rows[1].split(',').nth(1), Some("0"));
    assert_eq!(rows[2].split(',').nth(1), Some("1"));
}

#[test]
fn test_memory_sink_sees_every_tick() {
    let config = ServoConfig::default();
    let frames = (0..4).map(|_| blank());
    let mut servo = ServoLoop::new(
        ReplaySource::from_frames(frames),
        DryRunTransport::new(),
        Box::new(MemorySink::default()),
        &config,
    );
    let summary = servo
        .run(&mut StaticConfig(config.clone()), &mut Headless)
        .unwrap();
    assert_eq!(summary.frames, 4);
}

#[test]
fn test_sent_command_respects_fractional_actuator_limit() {
    let mut config = ServoConfig::default();
    config.actuator = ActuatorLimits {
        min: 0.0,
        center: 90.0,
        max: 100.6,
    };
    config.control.gain = 50.0;
    config.control.alpha = 1.0;

    let mut state = ControlState::seeded(&config.actuator);
    let candidate = ControlLaw::new().update(
        &mut state,
        &DetectionResult::at(100, 100, 2000.0),
        -10.0,
        &config.control,
        &config.actuator,
    );
    assert_eq!(candidate, 100.6);

    let mut transport = DryRunTransport::new();
    let sent = CommandGate::new().maybe_send(
        &mut transport,
        candidate,
        &config.gate,
        &config.actuator,
        Instant::now(),
    );
    assert_eq!(sent, Some(100));
}

#[test]
fn test_limits_narrowed_while_target_lost() {
    let config = ServoConfig::default();
    let mut pipeline = ServoPipeline::new(&config);
    let mut transport = DryRunTransport::new();
    let mut now = Instant::now();

    pipeline.tick(&blank(), &config, &mut transport, now);
    now += Duration::from_millis(100);

    let mut narrowed = config.clone();
    narrowed.actuator = ActuatorLimits {
        min: 30.0,
        center: 50.0,
        max: 60.0,
    };
    let snapshot = pipeline.tick(&blank(), &narrowed, &mut transport, now);
    assert!(!snapshot.target_found());
    assert_eq!(snapshot.raw_angle, 60.0);
    assert_eq!(snapshot.smoothed_angle, 60.0);
    assert_eq!(snapshot.command_sent, Some(60));
    assert_eq!(transport.sent(), &[90, 60]);
}
