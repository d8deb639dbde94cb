use mythlink_frame::longlong;
use tracing::{debug, warn};

use super::{number, recorder, remote_encoder, token};
use crate::connection::{Announce, Connection};
use crate::domain::{ChainId, FreeTuner, ProgramRecord, Tuner, TunerState};
use crate::error::{BackendError, Result};

impl Connection {
    /// Frames written so far by a recording tuner.
    pub fn frames_written(&mut self, tuner: &Tuner) -> Result<u64> {
        let reply = self.request(&[recorder(tuner.id), "GET_FRAMES_WRITTEN".into()])?;
        Ok(longlong::parse(
            token(&reply, 1, "GET_FRAMES_WRITTEN")?,
            token(&reply, 0, "GET_FRAMES_WRITTEN")?,
        )?)
    }

    /// Byte offset a recording tuner has reached in its file.
    pub fn file_position(&mut self, tuner: &Tuner) -> Result<u64> {
        let reply = self.request(&[recorder(tuner.id), "GET_FILE_POSITION".into()])?;
        Ok(longlong::parse(
            token(&reply, 1, "GET_FILE_POSITION")?,
            token(&reply, 0, "GET_FILE_POSITION")?,
        )?)
    }

    pub fn frame_rate(&mut self, tuner: &Tuner) -> Result<f64> {
        let reply = self.request(&[recorder(tuner.id), "GET_FRAMERATE".into()])?;
        number(&reply, 0, "GET_FRAMERATE")
    }

    pub fn tuner_state(&mut self, tuner: &Tuner) -> Result<TunerState> {
        let reply = self.request(&[remote_encoder(tuner.id), "GET_STATE".into()])?;
        let code: i32 = number(&reply, 0, "GET_STATE")?;
        TunerState::from_code(code)
            .ok_or_else(|| BackendError::UnexpectedReply(format!("GET_STATE: unknown state {code}")))
    }

    /// The program a busy tuner is recording or playing.
    pub fn current_recording(&mut self, tuner: &Tuner) -> Result<ProgramRecord> {
        let reply = self.request(&[recorder(tuner.id), "GET_CURRENT_RECORDING".into()])?;
        ProgramRecord::new(reply.into_tokens())
    }

    /// First tuner that is recording or watching `title`.
    ///
    /// Tuners are walked in catalog order; the walk stops at the first idle,
    /// failed or otherwise occupied tuner.
    pub fn tuner_showing(&mut self, title: &str) -> Result<Option<u32>> {
        let tuners = self.db()?.tuners()?;
        for tuner in tuners {
            match self.tuner_state(&tuner)? {
                TunerState::Ok => break,
                TunerState::Error => {
                    warn!(tuner = tuner.id, "GET_STATE reported an error");
                    break;
                }
                state if state.has_program() => {
                    if self.current_recording(&tuner)?.title() == title {
                        return Ok(Some(tuner.id));
                    }
                }
                _ => break,
            }
        }
        Ok(None)
    }

    pub fn free_tuner_count(&mut self) -> Result<u32> {
        let reply = self.request(&["GET_FREE_RECORDER_COUNT"])?;
        number(&reply, 0, "GET_FREE_RECORDER_COUNT")
    }

    /// A tuner that is not busy, if any.
    pub fn free_tuner(&mut self) -> Result<Option<FreeTuner>> {
        let reply = self.request(&["GET_FREE_RECORDER"])?;
        free_tuner_reply(&reply, "GET_FREE_RECORDER")
    }

    /// The next free tuner after `after`, if any.
    pub fn next_free_tuner(&mut self, after: u32) -> Result<Option<FreeTuner>> {
        let reply = self.request(&["GET_NEXT_FREE_RECORDER".to_string(), after.to_string()])?;
        free_tuner_reply(&reply, "GET_NEXT_FREE_RECORDER")
    }

    /// Start live TV on `tuner` at `channel`; returns the new chain id.
    pub fn spawn_live_tv(&mut self, tuner: &Tuner, channel: &str) -> Result<ChainId> {
        let chain_id = ChainId::generate(&self.config().client_hostname);
        let reply = self.request(&[
            recorder(tuner.id),
            "SPAWN_LIVETV".into(),
            chain_id.to_string(),
            "0".into(),
            channel.to_string(),
        ])?;
        debug!(tuner = tuner.id, %reply, "SPAWN_LIVETV");
        if !reply.is_ok() {
            return Err(BackendError::Server(format!(
                "error spawning live tv on tuner {} with reply {reply}",
                tuner.id
            )));
        }
        Ok(chain_id)
    }

    pub fn stop_live_tv(&mut self, tuner: &Tuner) -> Result<()> {
        let reply = self.request(&[recorder(tuner.id), "STOP_LIVETV".into()])?;
        debug!(tuner = tuner.id, %reply, "STOP_LIVETV");
        if !reply.is_ok() {
            return Err(BackendError::Server(format!(
                "error stopping live tv on tuner {} with reply {reply}",
                tuner.id
            )));
        }
        Ok(())
    }

    /// Whether `tuner` is recording. Tuners on a slave backend are asked over
    /// a short-lived socket to that host.
    pub fn is_recording(&mut self, tuner: &Tuner) -> Result<bool> {
        let command = [recorder(tuner.id), "IS_RECORDING".into()];
        let reply = if self.config().is_master(&tuner.hostname) {
            self.request(&command)?
        } else {
            debug!(host = %tuner.hostname, "tuner is on a slave backend");
            let mut slave = self.connect(Some(Announce::Playback), Some(&tuner.hostname))?;
            let reply = slave.request(&command);
            let closed = slave.close();
            let reply = reply?;
            closed?;
            reply
        };
        Ok(token(&reply, 0, "IS_RECORDING")? == "1")
    }
}

fn free_tuner_reply(reply: &mythlink_frame::Message, command: &str) -> Result<Option<FreeTuner>> {
    let id: i64 = number(reply, 0, command)?;
    if id < 0 {
        return Ok(None);
    }
    let id = u32::try_from(id)
        .map_err(|_| BackendError::UnexpectedReply(format!("{command}: tuner id {id}")))?;
    Ok(Some(FreeTuner {
        id,
        host: token(reply, 1, command)?.to_string(),
        port: number(reply, 2, command)?,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::collaborators::fake::FakeDatabase;
    use crate::domain::fixtures::program_tokens;
    use crate::domain::{RecordingStatus, Tuner, TunerState};
    use crate::error::BackendError;
    use crate::testing::{ConnScript, ScriptedBackend};

    fn tuner(id: u32) -> Tuner {
        Tuner::new(id, "127.0.0.1")
    }

    #[test]
    fn frame_counters_are_high_then_low() {
        let backend = ScriptedBackend::start(vec![ConnScript::handshake(40)
            .reply(&["1", "5"])
            .reply(&["0", "-1294967296"])]);
        let mut conn = backend.connection();

        assert_eq!(conn.frames_written(&tuner(1)).unwrap(), (1u64 << 32) + 5);
        assert_eq!(conn.file_position(&tuner(1)).unwrap(), 3_000_000_000);
        conn.close().unwrap();

        let received = backend.finish();
        assert_eq!(received[0][2], vec!["QUERY_RECORDER 1", "GET_FRAMES_WRITTEN"]);
        assert_eq!(received[0][3], vec!["QUERY_RECORDER 1", "GET_FILE_POSITION"]);
    }

    #[test]
    fn frame_rate_and_state() {
        let backend = ScriptedBackend::start(vec![ConnScript::handshake(40)
            .reply(&["29.97"])
            .reply(&["6"])
            .reply(&["99"])]);
        let mut conn = backend.connection();

        assert_eq!(conn.frame_rate(&tuner(2)).unwrap(), 29.97);
        assert_eq!(conn.tuner_state(&tuner(2)).unwrap(), TunerState::RecordingOnly);
        assert!(matches!(
            conn.tuner_state(&tuner(2)).unwrap_err(),
            BackendError::UnexpectedReply(_)
        ));
        conn.close().unwrap();

        let received = backend.finish();
        assert_eq!(received[0][3], vec!["QUERY_REMOTEENCODER 2", "GET_STATE"]);
    }

    #[test]
    fn free_tuners() {
        let backend = ScriptedBackend::start(vec![ConnScript::handshake(40)
            .reply(&["2"])
            .reply(&["3", "10.0.0.2", "6543"])
            .reply(&["-1"])
            .reply(&["-1", "", ""])]);
        let mut conn = backend.connection();

        assert_eq!(conn.free_tuner_count().unwrap(), 2);
        let free = conn.free_tuner().unwrap().expect("a free tuner");
        assert_eq!((free.id, free.host.as_str(), free.port), (3, "10.0.0.2", 6543));
        assert_eq!(conn.free_tuner().unwrap(), None);
        assert_eq!(conn.next_free_tuner(3).unwrap(), None);
        conn.close().unwrap();

        let received = backend.finish();
        assert_eq!(received[0][5], vec!["GET_NEXT_FREE_RECORDER", "3"]);
    }

    #[test]
    fn spawn_and_stop_live_tv() {
        let backend = ScriptedBackend::start(vec![ConnScript::handshake(40)
            .reply(&["ok"])
            .reply(&["bad"])
            .reply(&["OK"])]);
        let mut conn = backend.connection();

        let chain = conn.spawn_live_tv(&tuner(1), "3").unwrap();
        assert!(chain.as_str().starts_with("live-test-frontend-"));
        assert!(matches!(
            conn.spawn_live_tv(&tuner(1), "3").unwrap_err(),
            BackendError::Server(_)
        ));
        conn.stop_live_tv(&tuner(1)).unwrap();
        conn.close().unwrap();

        let received = backend.finish();
        let spawn = &received[0][2];
        assert_eq!(spawn[0], "QUERY_RECORDER 1");
        assert_eq!(spawn[1], "SPAWN_LIVETV");
        assert_eq!(spawn[2], chain.as_str());
        assert_eq!(&spawn[3..], ["0", "3"]);
        assert_eq!(received[0][4], vec!["QUERY_RECORDER 1", "STOP_LIVETV"]);
    }

    #[test]
    fn is_recording_on_master_uses_command_socket() {
        let backend =
            ScriptedBackend::start(vec![ConnScript::handshake(40).reply(&["1"]).reply(&["0"])]);
        let mut conn = backend.connection();
        assert!(conn.is_recording(&tuner(1)).unwrap());
        assert!(!conn.is_recording(&tuner(1)).unwrap());
        conn.close().unwrap();
        backend.finish();
    }

    #[test]
    fn is_recording_on_slave_opens_a_socket() {
        let backend = ScriptedBackend::start(vec![
            ConnScript::handshake(40),
            ConnScript::handshake(40).reply(&["1"]),
        ]);
        let mut conn = backend.connection();
        // "localhost" differs from the configured "127.0.0.1" master host.
        let slave = Tuner::new(4, "localhost");
        assert!(conn.is_recording(&slave).unwrap());
        conn.close().unwrap();

        let received = backend.finish();
        assert_eq!(
            received[1],
            vec![
                vec!["MYTH_PROTO_VERSION 40".to_string()],
                vec!["ANN Playback test-frontend 0".to_string()],
                vec!["QUERY_RECORDER 4".to_string(), "IS_RECORDING".to_string()],
                vec!["DONE".to_string()],
            ]
        );
    }

    #[test]
    fn tuner_showing_walks_busy_tuners() {
        let recording = program_tokens("News", "Default", 1, RecordingStatus::Recording);
        let other: Vec<&str> = recording.iter().map(String::as_str).collect();
        let mut news = other.clone();
        news[0] = "Late Show";

        let backend = ScriptedBackend::start(vec![ConnScript::handshake(40)
            .reply(&["1"])
            .reply(&other)
            .reply(&["6"])
            .reply(&news)]);
        let db = FakeDatabase {
            tuners: vec![tuner(1), tuner(2), tuner(3)],
            ..FakeDatabase::default()
        };
        let mut conn = backend.connection().with_database(Arc::new(db));

        assert_eq!(conn.tuner_showing("Late Show").unwrap(), Some(2));
        conn.close().unwrap();
        backend.finish();
    }

    #[test]
    fn tuner_showing_stops_at_idle_tuner() {
        let backend = ScriptedBackend::start(vec![ConnScript::handshake(40).reply(&["0"])]);
        let db = FakeDatabase {
            tuners: vec![tuner(1), tuner(2)],
            ..FakeDatabase::default()
        };
        let mut conn = backend.connection().with_database(Arc::new(db));
        assert_eq!(conn.tuner_showing("Anything").unwrap(), None);
        conn.close().unwrap();
        assert_eq!(backend.finish()[0].len(), 4);
    }
}
