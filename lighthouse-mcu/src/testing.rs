//! In-memory fakes for the hardware traits, used by unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lighthouse_proto::Uuid;

use crate::ble::{AdvertisingData, ConnDesc, ConnHandle, ConnParams, PeerAddress, RadioStack, ScanResponse};
use crate::blink::{Alarm, PixelStrip};
use crate::config::Rgb;
use crate::error::{FlashError, RadioError, SwitchError};
use crate::light::Switch;
use crate::outdoor::Dimmer;
use crate::storage::{FileStore, Flash, Namespace, ReadSeek, Value, ValueKind};

// Flash

#[derive(Default)]
struct NsState {
    values: HashMap<String, Value>,
    unsupported: HashSet<ValueKind>,
    writes: usize,
    commits: usize,
    reads: usize,
    uncommitted: bool,
    interleaved: bool,
    fail_set: Option<FlashError>,
}

/// Namespace backed by a map. Clones share state, so a test can keep a
/// probe while the settings store owns another handle.
#[derive(Clone, Default)]
pub struct MemNamespace(Arc<Mutex<NsState>>);

impl MemNamespace {
    pub fn writes(&self) -> usize {
        self.0.lock().unwrap().writes
    }

    pub fn commits(&self) -> usize {
        self.0.lock().unwrap().commits
    }

    pub fn reads(&self) -> usize {
        self.0.lock().unwrap().reads
    }

    pub fn unsupport(&self, kind: ValueKind) {
        self.0.lock().unwrap().unsupported.insert(kind);
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.0.lock().unwrap().values.insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.0.lock().unwrap().values.get(key).cloned()
    }

    /// Make every following `set` fail with `err`
    pub fn fail_writes(&self, err: FlashError) {
        self.0.lock().unwrap().fail_set = Some(err);
    }

    /// True if a `set` ever started while another was still uncommitted
    pub fn saw_interleaving(&self) -> bool {
        self.0.lock().unwrap().interleaved
    }

    fn clear(&self) {
        self.0.lock().unwrap().values.clear();
    }
}

impl Namespace for MemNamespace {
    fn supports(&self, kind: ValueKind) -> bool {
        !self.0.lock().unwrap().unsupported.contains(&kind)
    }

    fn get(&self, kind: ValueKind, key: &str) -> Result<Option<Value>, FlashError> {
        let mut state = self.0.lock().unwrap();
        state.reads += 1;
        match state.values.get(key) {
            Some(v) if v.kind() != kind => Err(FlashError::TypeMismatch),
            other => Ok(other.cloned()),
        }
    }

    fn set(&mut self, key: &str, value: &Value) -> Result<(), FlashError> {
        let mut state = self.0.lock().unwrap();
        if let Some(err) = state.fail_set.clone() {
            return Err(err);
        }
        if state.uncommitted {
            state.interleaved = true;
        }
        state.uncommitted = true;
        state.writes += 1;
        state.values.insert(key.to_string(), value.clone());
        drop(state);
        // widen the window a racing writer would need
        std::thread::yield_now();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), FlashError> {
        let mut state = self.0.lock().unwrap();
        state.uncommitted = false;
        state.commits += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemFlash {
    ns: MemNamespace,
    init_failures: VecDeque<FlashError>,
    erases: usize,
}

impl MemFlash {
    /// Probe handle onto the namespace `open` hands out
    pub fn namespace(&self) -> MemNamespace {
        self.ns.clone()
    }

    pub fn fail_next_init(&mut self, err: FlashError) {
        self.init_failures.push_back(err);
    }

    pub fn erases(&self) -> usize {
        self.erases
    }
}

impl Flash for MemFlash {
    type Namespace = MemNamespace;

    fn init(&mut self) -> Result<(), FlashError> {
        match self.init_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn erase(&mut self) -> Result<(), FlashError> {
        self.erases += 1;
        self.ns.clear();
        Ok(())
    }

    fn open(&mut self, _namespace: &str) -> Result<MemNamespace, FlashError> {
        Ok(self.ns.clone())
    }
}

// Files

struct CountingReader {
    inner: Cursor<Vec<u8>>,
    reads: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| n >= limit) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
        }
        self.inner.read(buf)
    }
}

impl Seek for CountingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[derive(Default)]
pub struct MemFiles {
    files: HashMap<String, Vec<u8>>,
    reads: Arc<AtomicUsize>,
    fail_mount: bool,
    fail_reads_after: Option<usize>,
    pub mounted: bool,
    pub unmounts: usize,
}

impl MemFiles {
    pub fn with_file(path: &str, data: &[u8]) -> Self {
        let mut files = Self::default();
        files.files.insert(path.to_string(), data.to_vec());
        files
    }

    pub fn fail_mount(&mut self) {
        self.fail_mount = true;
    }

    /// Reads succeed `n` times, then fail
    pub fn fail_reads_after(&mut self, n: usize) {
        self.fail_reads_after = Some(n);
    }

    /// Number of `read` calls across all opened files
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl FileStore for MemFiles {
    fn mount(&mut self) -> io::Result<()> {
        if self.fail_mount {
            return Err(io::Error::new(io::ErrorKind::Other, "mount failed"));
        }
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
        self.unmounts += 1;
    }

    fn open(&mut self, path: &str) -> io::Result<Box<dyn ReadSeek>> {
        let data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        Ok(Box::new(CountingReader {
            inner: Cursor::new(data),
            reads: self.reads.clone(),
            fail_after: self.fail_reads_after,
        }))
    }
}

// Effects

#[derive(Default)]
struct SwitchState {
    running: bool,
    starts: usize,
    stops: usize,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct FakeSwitch(Arc<Mutex<SwitchState>>);

impl FakeSwitch {
    pub fn starts(&self) -> usize {
        self.0.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.0.lock().unwrap().stops
    }

    pub fn fail(&self) {
        self.0.lock().unwrap().fail = true;
    }
}

impl Switch for FakeSwitch {
    fn start(&mut self) -> Result<(), SwitchError> {
        let mut state = self.0.lock().unwrap();
        if state.fail {
            return Err(SwitchError::NotInitialized);
        }
        state.starts += 1;
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SwitchError> {
        let mut state = self.0.lock().unwrap();
        if state.fail {
            return Err(SwitchError::NotInitialized);
        }
        state.stops += 1;
        state.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.0.lock().unwrap().running
    }
}

#[derive(Default)]
struct StripState {
    pixels: Vec<Rgb>,
    refreshes: usize,
}

#[derive(Clone)]
pub struct FakeStrip(Arc<Mutex<StripState>>);

impl FakeStrip {
    pub fn new(len: usize) -> Self {
        Self(Arc::new(Mutex::new(StripState {
            pixels: vec![Rgb::OFF; len],
            refreshes: 0,
        })))
    }

    pub fn pixels(&self) -> Vec<Rgb> {
        self.0.lock().unwrap().pixels.clone()
    }

    pub fn refreshes(&self) -> usize {
        self.0.lock().unwrap().refreshes
    }
}

impl PixelStrip for FakeStrip {
    fn len(&self) -> usize {
        self.0.lock().unwrap().pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), SwitchError> {
        let mut state = self.0.lock().unwrap();
        match state.pixels.get_mut(index) {
            Some(p) => {
                *p = color;
                Ok(())
            }
            None => Err(SwitchError::Strip(format!("pixel {} out of range", index))),
        }
    }

    fn refresh(&mut self) -> Result<(), SwitchError> {
        self.0.lock().unwrap().refreshes += 1;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeAlarm {
    pub armed: Arc<AtomicBool>,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

impl Alarm for FakeAlarm {
    fn start(&mut self) -> Result<(), SwitchError> {
        self.armed.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SwitchError> {
        self.armed.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeDimmer {
    max: u32,
    duties: Arc<Mutex<Vec<u32>>>,
}

impl FakeDimmer {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            duties: Arc::default(),
        }
    }

    pub fn duties(&self) -> Vec<u32> {
        self.duties.lock().unwrap().clone()
    }
}

impl Dimmer for FakeDimmer {
    fn max_duty(&self) -> u32 {
        self.max
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), SwitchError> {
        self.duties.lock().unwrap().push(duty);
        Ok(())
    }
}

// Radio

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    UpdateParams(ConnHandle, ConnParams),
    SetAdvertisingData(AdvertisingData),
    SetScanResponse(ScanResponse),
    StartAdvertising,
    Terminate(ConnHandle, u8),
    DeleteBond(PeerAddress),
    InjectPasskey(ConnHandle, u32),
    Notify(ConnHandle, Uuid, Vec<u8>),
}

/// Radio stack that records every call
#[derive(Default)]
pub struct FakeRadio {
    pub conns: HashMap<ConnHandle, ConnDesc>,
    pub mtu: u16,
    pub calls: Vec<RadioCall>,
    /// Notifications succeed this many times, then fail
    pub notify_budget: Option<usize>,
}

impl FakeRadio {
    /// Register a live connection the stack knows about
    pub fn add_conn(&mut self, conn: ConnHandle) -> ConnDesc {
        let desc = ConnDesc {
            handle: conn,
            peer: PeerAddress {
                kind: 0,
                val: [0xC0, 0xFF, 0xEE, 0x00, 0x00, conn.0 as u8],
            },
            interval: 24,
            latency: 0,
            supervision_timeout: 400,
            encrypted: false,
            authenticated: false,
            bonded: false,
        };
        self.conns.insert(conn, desc);
        desc
    }

    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn advertising_starts(&self) -> usize {
        self.count(|c| matches!(c, RadioCall::StartAdvertising))
    }

    pub fn notifications(&self) -> Vec<(ConnHandle, Uuid, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::Notify(conn, chr, data) => Some((*conn, *chr, data.clone())),
                _ => None,
            })
            .collect()
    }
}

impl RadioStack for FakeRadio {
    fn conn_desc(&self, conn: ConnHandle) -> Option<ConnDesc> {
        self.conns.get(&conn).copied()
    }

    fn update_conn_params(&mut self, conn: ConnHandle, params: &ConnParams) -> Result<(), RadioError> {
        self.calls.push(RadioCall::UpdateParams(conn, *params));
        Ok(())
    }

    fn set_advertising_data(&mut self, data: &AdvertisingData) -> Result<(), RadioError> {
        self.calls.push(RadioCall::SetAdvertisingData(data.clone()));
        Ok(())
    }

    fn set_scan_response(&mut self, rsp: &ScanResponse) -> Result<(), RadioError> {
        self.calls.push(RadioCall::SetScanResponse(rsp.clone()));
        Ok(())
    }

    fn start_advertising(&mut self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::StartAdvertising);
        Ok(())
    }

    fn terminate(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Terminate(conn, reason));
        Ok(())
    }

    fn delete_bond(&mut self, peer: &PeerAddress) -> Result<(), RadioError> {
        self.calls.push(RadioCall::DeleteBond(*peer));
        Ok(())
    }

    fn inject_passkey(&mut self, conn: ConnHandle, passkey: u32) -> Result<(), RadioError> {
        self.calls.push(RadioCall::InjectPasskey(conn, passkey));
        Ok(())
    }

    fn notify(&mut self, conn: ConnHandle, chr: Uuid, data: &[u8]) -> Result<(), RadioError> {
        if let Some(budget) = self.notify_budget.as_mut() {
            if *budget == 0 {
                return Err(RadioError::new("notify", 7));
            }
            *budget -= 1;
        }
        self.calls.push(RadioCall::Notify(conn, chr, data.to_vec()));
        Ok(())
    }

    fn att_mtu(&self, _conn: ConnHandle) -> u16 {
        self.mtu
    }
}
