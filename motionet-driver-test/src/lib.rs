
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{Arc, Mutex},
    time::Duration,
};

// used to mock a serial link to test the motionet driver.
// writes are checked byte for byte against the scripted expectation and panic
// on any mismatch. scripted reads only become visible once every write
// scripted before them has fully completed, which models the half-duplex
// request/response pairing: the controller cannot answer a request the driver
// hasn't sent yet. a read with nothing visible fails with TimedOut exactly
// like a real port whose timeout elapsed, or returns 0 in eof mode to
// simulate the device disappearing.
//
// don't be alarmed if you think it's slow or inefficient or anything, it
// doesn't need to be fast nor pretty nor efficient, its just for testing. it
// needs to be easy
pub struct Interface {
    state: Arc<Mutex<State>>,
}

struct State {
    // (gate, bytes): the chunk is readable once `gate` writes completed
    reads: VecDeque<(usize, Vec<u8>)>,
    writes: VecDeque<Vec<u8>>,
    scripted_writes: usize,
    writes_done: usize,
    eof_when_empty: bool,
    read_timeout: Duration,
}

impl Interface {
    pub fn new() -> Self {
        Interface {
            state: Arc::new(Mutex::new(State {
                reads: VecDeque::new(),
                writes: VecDeque::new(),
                scripted_writes: 0,
                writes_done: 0,
                eof_when_empty: false,
                read_timeout: Duration::ZERO,
            })),
        }
    }

    /// Scripts bytes the driver is expected to write next
    pub fn add_write(&self, expected: &[u8]) {
        let mut st = self.state.lock().unwrap();
        st.writes.push_back(expected.to_vec());
        st.scripted_writes += 1;
    }

    /// Scripts bytes the driver may read once all previously scripted writes
    /// have completed
    pub fn add_read(&self, bytes: &[u8]) {
        let mut st = self.state.lock().unwrap();
        let gate = st.scripted_writes;
        st.reads.push_back((gate, bytes.to_vec()));
    }

    /// Scripts one request/response pair
    pub fn add_exchange(&self, request: &[u8], response: &[u8]) {
        self.add_write(request);
        self.add_read(response);
    }

    /// When set, an exhausted read buffer reads as end-of-stream (device
    /// gone) instead of a timeout
    pub fn set_eof_when_empty(&self, eof: bool) {
        self.state.lock().unwrap().eof_when_empty = eof;
    }

    /// Everything scripted has been consumed
    pub fn is_empty(&self) -> bool {
        let st = self.state.lock().unwrap();
        st.reads.is_empty() && st.writes.is_empty()
    }

    /// Number of scripted writes the driver has fully performed
    pub fn writes_done(&self) -> usize {
        self.state.lock().unwrap().writes_done
    }

    /// The read timeout the driver last configured
    pub fn last_read_timeout(&self) -> Duration {
        self.state.lock().unwrap().read_timeout
    }
}

impl Default for Interface {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Interface {
    fn clone(&self) -> Self {
        Interface {
            state: Arc::clone(&self.state),
        }
    }
}

impl Read for Interface {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut st = self.state.lock().unwrap();
        let mut out = Vec::new();
        while let Some((gate, _)) = st.reads.front() {
            if *gate > st.writes_done || out.len() >= buf.len() {
                break;
            }
            // pop is fine, the gate was already checked
            let (_, chunk) = st.reads.pop_front().unwrap();
            out.extend_from_slice(&chunk);
        }
        if out.len() > buf.len() {
            let rest = out.split_off(buf.len());
            st.reads.push_front((0, rest));
        }
        if out.is_empty() {
            if st.eof_when_empty {
                return Ok(0);
            }
            return Err(io::Error::new(io::ErrorKind::TimedOut, "nothing scripted"));
        }
        buf[..out.len()].copy_from_slice(&out);
        Ok(out.len())
    }
}

impl Write for Interface {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut st = self.state.lock().unwrap();
        let mut remaining = buf;
        while !remaining.is_empty() {
            let front = match st.writes.front_mut() {
                Some(front) => front,
                None => panic!("unexpected write: {:02x?}", remaining),
            };
            let n = remaining.len().min(front.len());
            if front[..n] != remaining[..n] {
                panic!(
                    "write {:02x?} doesn't match expected {:02x?}",
                    remaining, front
                );
            }
            front.drain(..n);
            if front.is_empty() {
                st.writes.pop_front();
                st.writes_done += 1;
            }
            remaining = &remaining[n..];
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl motionet_driver::Interface for Interface {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.state.lock().unwrap().read_timeout = timeout;
        Ok(())
    }
}
