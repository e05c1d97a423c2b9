//! Scripted backend for dispatch tests.
//!
//! Records every upload and launch, can fail a chosen call with a chosen
//! status, and can hold one device's completion events behind a gate.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use mgpu_common::{BackendError, LaunchDims};
use mgpu_opencl::{CompletionEvent, ComputeBackend};

#[derive(Debug, Clone, PartialEq)]
pub struct UploadLog {
    pub device: usize,
    pub buffer: usize,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchLog {
    pub device: usize,
    pub input: usize,
    pub output: usize,
    pub dims: LaunchDims,
    /// Contents of the input buffer when the launch was enqueued.
    pub input_seen: Vec<f32>,
    pub thread: Option<String>,
}

/// Blocks waiters until opened.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
    waiting: AtomicUsize,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    fn wait(&self) {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeBuffer {
    pub id: usize,
    data: Arc<Mutex<Vec<f32>>>,
}

impl FakeBuffer {
    pub fn contents(&self) -> Vec<f32> {
        self.data.lock().unwrap().clone()
    }
}

#[derive(Debug)]
pub struct FakeKernel {
    device: usize,
    args: Option<(FakeBuffer, FakeBuffer)>,
}

pub struct FakeEvent {
    gate: Option<Arc<Gate>>,
    result: Result<(), BackendError>,
}

impl CompletionEvent for FakeEvent {
    fn wait(self) -> Result<(), BackendError> {
        if let Some(gate) = self.gate {
            gate.wait();
        }
        self.result
    }
}

#[derive(Debug, Default)]
pub struct FakeProgram {
    pub options: String,
}

/// Injected failure: `(target, status)`.
type Fault = Option<(usize, i32)>;

#[derive(Default)]
pub struct FakeBackend {
    devices: usize,
    next_id: AtomicUsize,
    allocation_calls: AtomicUsize,
    released: AtomicUsize,
    uploads: Mutex<Vec<UploadLog>>,
    launches: Mutex<Vec<LaunchLog>>,
    fail_allocation: Fault,
    fail_write: Fault,
    fail_enqueue: Fault,
    fail_wait: Fault,
    held: Option<(usize, Arc<Gate>)>,
}

impl FakeBackend {
    pub fn new(devices: usize) -> Self {
        Self { devices, ..Default::default() }
    }

    /// Fail the `nth` (0-based) `create_buffer` call.
    pub fn fail_allocation_at(mut self, nth: usize, status: i32) -> Self {
        self.fail_allocation = Some((nth, status));
        self
    }

    pub fn fail_write_on(mut self, device: usize, status: i32) -> Self {
        self.fail_write = Some((device, status));
        self
    }

    pub fn fail_enqueue_on(mut self, device: usize, status: i32) -> Self {
        self.fail_enqueue = Some((device, status));
        self
    }

    pub fn fail_wait_on(mut self, device: usize, status: i32) -> Self {
        self.fail_wait = Some((device, status));
        self
    }

    /// Kernel events of `device` block until the returned gate opens.
    pub fn hold_device(mut self, device: usize) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        self.held = Some((device, Arc::clone(&gate)));
        (self, gate)
    }

    pub fn uploads(&self) -> Vec<UploadLog> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn launches(&self) -> Vec<LaunchLog> {
        self.launches.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn fault(fault: Fault, target: usize, op: &str) -> Result<(), BackendError> {
        match fault {
            Some((t, status)) if t == target => {
                Err(BackendError::new(status, format!("injected {op} failure")))
            }
            _ => Ok(()),
        }
    }
}

impl ComputeBackend for FakeBackend {
    type Buffer = FakeBuffer;
    type Kernel = FakeKernel;
    type Program = FakeProgram;
    type Event = FakeEvent;

    fn name(&self) -> &str {
        "fake"
    }

    fn device_count(&self) -> usize {
        self.devices
    }

    fn device_name(&self, device: usize) -> String {
        format!("fake{device}")
    }

    fn build_program(&self, source: &str, options: &str) -> Result<FakeProgram, BackendError> {
        if !source.contains("__kernel") {
            return Err(BackendError::new(mgpu_common::status::BUILD_PROGRAM_FAILURE, "no kernels"));
        }
        Ok(FakeProgram { options: options.to_string() })
    }

    fn create_kernel(
        &self,
        _program: &FakeProgram,
        _entry_point: &str,
        device: usize,
    ) -> Result<FakeKernel, BackendError> {
        Ok(FakeKernel { device, args: None })
    }

    fn create_buffer(&self, bytes: usize) -> Result<FakeBuffer, BackendError> {
        let call = self.allocation_calls.fetch_add(1, Ordering::SeqCst);
        Self::fault(self.fail_allocation, call, "allocation")?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(FakeBuffer { id, data: Arc::new(Mutex::new(vec![0.0; bytes / 4])) })
    }

    fn release_buffer(&self, _buffer: FakeBuffer) -> Result<(), BackendError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_buffer(
        &self,
        device: usize,
        buffer: &mut FakeBuffer,
        data: &[f32],
    ) -> Result<FakeEvent, BackendError> {
        Self::fault(self.fail_write, device, "write")?;
        buffer.data.lock().unwrap().copy_from_slice(data);
        self.uploads.lock().unwrap().push(UploadLog {
            device,
            buffer: buffer.id,
            data: data.to_vec(),
        });
        Ok(FakeEvent { gate: None, result: Ok(()) })
    }

    fn set_kernel_args(
        &self,
        kernel: &mut FakeKernel,
        input: &FakeBuffer,
        output: &FakeBuffer,
    ) -> Result<(), BackendError> {
        kernel.args = Some((input.clone(), output.clone()));
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        device: usize,
        kernel: &FakeKernel,
        dims: &LaunchDims,
    ) -> Result<FakeEvent, BackendError> {
        assert_eq!(kernel.device, device, "kernel enqueued on a foreign queue");
        Self::fault(self.fail_enqueue, device, "enqueue")?;
        let (input, output) = kernel.args.as_ref().expect("arguments bound before launch");

        let input_seen = input.contents();
        output.data.lock().unwrap().copy_from_slice(&input_seen);
        self.launches.lock().unwrap().push(LaunchLog {
            device,
            input: input.id,
            output: output.id,
            dims: *dims,
            input_seen,
            thread: std::thread::current().name().map(str::to_string),
        });

        let gate = self.held.as_ref().filter(|(d, _)| *d == device).map(|(_, g)| Arc::clone(g));
        let result = Self::fault(self.fail_wait, device, "wait");
        Ok(FakeEvent { gate, result })
    }
}
