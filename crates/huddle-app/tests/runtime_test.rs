//! Runtime integration tests.

use std::time::Duration;

use huddle_app::{Command, Driver, Flow, Input, OutgoingFile, Runtime, UploadError};
use huddle_client::{Notice, SessionConfig};
use huddle_core::ChannelState;
use huddle_harness::{FakeUploader, SimDriver, SimEnv, SimMedia};
use huddle_proto::{OutboundEvent, RoomId};

type TestRuntime = Runtime<SimDriver, SimMedia, FakeUploader, SimEnv>;

fn runtime() -> (TestRuntime, SimDriver, FakeUploader, SimEnv) {
    let driver = SimDriver::new();
    let media = SimMedia::new(driver.clone());
    let uploader = FakeUploader::new();
    let env = SimEnv::with_seed(11);
    let runtime = Runtime::new(
        driver.clone(),
        media,
        uploader.clone(),
        env.clone(),
        SessionConfig::default(),
    );
    (runtime, driver, uploader, env)
}

#[tokio::test]
async fn run_stops_on_quit_and_closes_the_channel() {
    let (mut runtime, driver, _, _) = runtime();
    driver.command(Command::Quit);
    driver.command(Command::SelectRoom("r1".into()));

    runtime.run().await.unwrap();

    assert_eq!(driver.connects(), 1);
    assert!(!driver.is_connected());
    assert_eq!(runtime.session().channel_state(), ChannelState::Closed);
    assert_eq!(driver.take_notices(), vec![Notice::Channel(ChannelState::Connected)]);
    // input after quit is never read
    assert!(driver.has_pending());
}

#[tokio::test]
async fn exhausted_input_ends_the_run() {
    let (mut runtime, driver, _, _) = runtime();

    runtime.run().await.unwrap();

    assert_eq!(runtime.session().channel_state(), ChannelState::Closed);
    assert!(!driver.is_connected());
}

#[tokio::test]
async fn refused_connect_leaves_session_disconnected() {
    let (mut runtime, driver, _, _) = runtime();
    driver.refuse_next_connect();

    runtime.start().await.unwrap();

    assert_eq!(driver.connects(), 0);
    assert_eq!(runtime.session().channel_state(), ChannelState::Disconnected);
    assert_eq!(driver.take_notices(), vec![Notice::Channel(ChannelState::Disconnected)]);
}

#[tokio::test]
async fn failed_send_marks_channel_lost() {
    let (mut runtime, mut driver, _, _) = runtime();
    runtime.start().await.unwrap();
    driver.take_notices();

    // transport goes away without the runtime hearing about it
    driver.disconnect("test").await;
    let input = Input::Command(Command::SendMessage { room_id: "r1".into(), content: "hi".into() });
    assert_eq!(runtime.handle_input(input).await.unwrap(), Flow::Continue);

    assert_eq!(runtime.session().channel_state(), ChannelState::Disconnected);
    assert_eq!(driver.take_notices(), vec![Notice::Channel(ChannelState::Disconnected)]);
    assert!(driver.take_sent().is_empty());
}

#[tokio::test]
async fn sends_after_a_failed_send_are_dropped() {
    let (mut runtime, mut driver, _, _) = runtime();
    runtime.start().await.unwrap();
    runtime.handle_input(Input::Command(Command::Keystroke("r1".into()))).await.unwrap();
    driver.take_sent();

    driver.disconnect("test").await;
    // message:send and user:stop-typing go out in one batch
    let input = Input::Command(Command::SendMessage { room_id: "r1".into(), content: "hi".into() });
    runtime.handle_input(input).await.unwrap();

    assert_eq!(driver.failed_sends(), 1);
    assert_eq!(runtime.session().channel_state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn upload_failure_is_reported_to_the_driver() {
    let (mut runtime, driver, uploader, _) = runtime();
    runtime.start().await.unwrap();
    uploader.fail_next(UploadError::Transport("reset".into()));

    let file = OutgoingFile::new("notes.txt", "text/plain", b"hello".to_vec());
    let input = Input::Command(Command::SendFile { room_id: "r1".into(), file });
    runtime.handle_input(input).await.unwrap();

    assert_eq!(driver.upload_failures(), vec![(
        RoomId::new("r1"),
        UploadError::Transport("reset".into())
    )]);
    assert!(driver.take_sent().is_empty());
    assert!(uploader.uploaded().is_empty());
}

#[tokio::test]
async fn uploaded_file_is_sent_as_attachment() {
    let (mut runtime, driver, uploader, _) = runtime();
    runtime.start().await.unwrap();

    let file = OutgoingFile::new("notes.txt", "text/plain", b"hello".to_vec());
    let input = Input::Command(Command::SendFile { room_id: "r1".into(), file });
    runtime.handle_input(input).await.unwrap();

    let [OutboundEvent::SendMessage(send)] = &driver.take_sent_events()[..] else {
        panic!("expected one message:send");
    };
    assert_eq!(send.content, "notes.txt");
    assert_eq!(send.file.as_ref().map(|f| f.size), Some(5));
    assert_eq!(uploader.uploaded().len(), 1);
}

#[tokio::test]
async fn tick_after_quiet_period_stops_typing() {
    let (mut runtime, driver, _, env) = runtime();
    runtime.start().await.unwrap();

    runtime.handle_input(Input::Command(Command::Keystroke("r1".into()))).await.unwrap();
    assert!(matches!(driver.take_sent_events()[..], [OutboundEvent::Typing { .. }]));

    env.advance(Duration::from_secs(1));
    runtime.handle_input(Input::Tick).await.unwrap();
    assert!(driver.take_sent().is_empty());

    env.advance(Duration::from_secs(1));
    runtime.handle_input(Input::Tick).await.unwrap();
    assert_eq!(driver.take_sent_events(), vec![OutboundEvent::StopTyping {
        room_id: "r1".into()
    }]);
}

#[tokio::test]
async fn shutdown_stops_typing_before_closing() {
    let (mut runtime, driver, _, _) = runtime();
    runtime.start().await.unwrap();
    runtime.handle_input(Input::Command(Command::Keystroke("r1".into()))).await.unwrap();
    driver.take_sent();

    runtime.shutdown().await.unwrap();

    assert_eq!(driver.take_sent_events(), vec![OutboundEvent::StopTyping {
        room_id: "r1".into()
    }]);
    assert!(!driver.is_connected());
}
