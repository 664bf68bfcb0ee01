//! Parallel compute device.
//!
//! The device owns nothing but bookkeeping: buffers are plain typed arrays
//! handed out by [`Device::create_buffer`], and every compute stage is a
//! dispatch of one kernel closure over N independent lanes. A lane may only
//! write its own element of each output buffer; everything else the kernel
//! needs is captured by shared reference, so a dispatch cannot race with
//! itself. Ordering between stages is the ordering of `dispatch` calls.
//!
//! With the `parallel` feature lanes run on the rayon pool, otherwise they
//! run in order on the calling thread. Both produce identical results.

use std::mem;

use log::{debug, trace};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use thiserror::Error;

/// Default upper bound on lanes per dispatch.
pub const DEFAULT_MAX_LANES: usize = 1 << 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("compute device lost")]
    Lost,
    #[error("dispatch `{label}` requested {lanes} lanes (limit {max})")]
    DispatchTooLarge {
        label: &'static str,
        lanes: usize,
        max: usize,
    },
    #[error("dispatch `{label}`: buffer `{buffer}` holds {len} elements for {lanes} lanes")]
    LaneMismatch {
        label: &'static str,
        buffer: &'static str,
        len: usize,
        lanes: usize,
    },
    #[error("buffer `{label}` holds {expected} elements, upload has {actual}")]
    SizeMismatch {
        label: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// A typed array resident on the device.
#[derive(Debug)]
pub struct DeviceBuffer<T> {
    label: &'static str,
    data: Vec<T>,
}

impl<T> DeviceBuffer<T> {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only view of the contents. Callers outside the pipeline must
    /// drain the device first.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn byte_size(&self) -> usize {
        self.data.len() * mem::size_of::<T>()
    }
}

impl<T: Copy> DeviceBuffer<T> {
    /// Upload `values`. The buffer never changes size; a length mismatch is
    /// an error and leaves the contents untouched.
    pub fn write(&mut self, values: &[T]) -> Result<(), DeviceError> {
        if values.len() != self.data.len() {
            return Err(DeviceError::SizeMismatch {
                label: self.label,
                expected: self.data.len(),
                actual: values.len(),
            });
        }
        self.data.copy_from_slice(values);
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

pub struct Device {
    max_lanes: usize,
    lost: bool,
    submitted: u64,
    retired: u64,
    live_buffers: usize,
    live_bytes: usize,
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Device {
    pub fn new() -> Self {
        Self::with_max_lanes(DEFAULT_MAX_LANES)
    }

    pub fn with_max_lanes(max_lanes: usize) -> Self {
        Self {
            max_lanes,
            lost: false,
            submitted: 0,
            retired: 0,
            live_buffers: 0,
            live_bytes: 0,
        }
    }

    pub fn create_buffer<T: Copy + Default>(
        &mut self,
        label: &'static str,
        len: usize,
    ) -> DeviceBuffer<T> {
        self.track(DeviceBuffer {
            label,
            data: vec![T::default(); len],
        })
    }

    pub fn create_buffer_init<T: Copy>(
        &mut self,
        label: &'static str,
        contents: &[T],
    ) -> DeviceBuffer<T> {
        self.track(DeviceBuffer {
            label,
            data: contents.to_vec(),
        })
    }

    fn track<T>(&mut self, buffer: DeviceBuffer<T>) -> DeviceBuffer<T> {
        self.live_buffers += 1;
        self.live_bytes += buffer.byte_size();
        debug!(
            "alloc `{}`: {} x {} bytes",
            buffer.label,
            buffer.len(),
            mem::size_of::<T>()
        );
        buffer
    }

    /// Block until every submitted dispatch has retired. The returned guard
    /// holds the device exclusively, so buffers released through it cannot
    /// be referenced by in-flight work.
    pub fn drain(&mut self) -> Idle<'_> {
        if self.lost {
            // Work on a lost device never completes; it is abandoned.
            self.retired = self.submitted;
        }
        debug_assert_eq!(self.submitted, self.retired);
        Idle { device: self }
    }

    pub fn wait_idle(&mut self) {
        self.drain();
    }

    /// Simulate device removal: every later dispatch fails with `Lost`.
    pub fn lose(&mut self) {
        self.lost = true;
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn max_lanes(&self) -> usize {
        self.max_lanes
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Number of dispatches issued since creation.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn pending(&self) -> u64 {
        self.submitted - self.retired
    }

    fn begin(
        &mut self,
        label: &'static str,
        lanes: usize,
        outputs: &[(&'static str, usize)],
    ) -> Result<(), DeviceError> {
        if self.lost {
            return Err(DeviceError::Lost);
        }
        if lanes > self.max_lanes {
            return Err(DeviceError::DispatchTooLarge {
                label,
                lanes,
                max: self.max_lanes,
            });
        }
        for &(buffer, len) in outputs {
            if len != lanes {
                return Err(DeviceError::LaneMismatch {
                    label,
                    buffer,
                    len,
                    lanes,
                });
            }
        }
        trace!("dispatch `{}`: {} lanes", label, lanes);
        self.submitted += 1;
        Ok(())
    }

    fn finish(&mut self) {
        self.retired += 1;
    }

    /// Run `kernel(lane, &mut out[lane])` for every lane.
    pub fn dispatch<A, F>(
        &mut self,
        label: &'static str,
        lanes: usize,
        out: &mut DeviceBuffer<A>,
        kernel: F,
    ) -> Result<(), DeviceError>
    where
        A: Send,
        F: Fn(usize, &mut A) + Send + Sync,
    {
        self.begin(label, lanes, &[(out.label, out.len())])?;

        #[cfg(feature = "parallel")]
        out.data.par_iter_mut().enumerate().for_each(|(i, a)| kernel(i, a));
        #[cfg(not(feature = "parallel"))]
        out.data.iter_mut().enumerate().for_each(|(i, a)| kernel(i, a));

        self.finish();
        Ok(())
    }

    /// Like [`Device::dispatch`] with two output buffers.
    pub fn dispatch_pair<A, B, F>(
        &mut self,
        label: &'static str,
        lanes: usize,
        out_a: &mut DeviceBuffer<A>,
        out_b: &mut DeviceBuffer<B>,
        kernel: F,
    ) -> Result<(), DeviceError>
    where
        A: Send,
        B: Send,
        F: Fn(usize, &mut A, &mut B) + Send + Sync,
    {
        self.begin(
            label,
            lanes,
            &[(out_a.label, out_a.len()), (out_b.label, out_b.len())],
        )?;

        #[cfg(feature = "parallel")]
        out_a
            .data
            .par_iter_mut()
            .zip(out_b.data.par_iter_mut())
            .enumerate()
            .for_each(|(i, (a, b))| kernel(i, a, b));
        #[cfg(not(feature = "parallel"))]
        out_a
            .data
            .iter_mut()
            .zip(out_b.data.iter_mut())
            .enumerate()
            .for_each(|(i, (a, b))| kernel(i, a, b));

        self.finish();
        Ok(())
    }

    /// Like [`Device::dispatch`] with three output buffers.
    pub fn dispatch_triple<A, B, C, F>(
        &mut self,
        label: &'static str,
        lanes: usize,
        out_a: &mut DeviceBuffer<A>,
        out_b: &mut DeviceBuffer<B>,
        out_c: &mut DeviceBuffer<C>,
        kernel: F,
    ) -> Result<(), DeviceError>
    where
        A: Send,
        B: Send,
        C: Send,
        F: Fn(usize, &mut A, &mut B, &mut C) + Send + Sync,
    {
        self.begin(
            label,
            lanes,
            &[
                (out_a.label, out_a.len()),
                (out_b.label, out_b.len()),
                (out_c.label, out_c.len()),
            ],
        )?;

        #[cfg(feature = "parallel")]
        out_a
            .data
            .par_iter_mut()
            .zip(out_b.data.par_iter_mut())
            .zip(out_c.data.par_iter_mut())
            .enumerate()
            .for_each(|(i, ((a, b), c))| kernel(i, a, b, c));
        #[cfg(not(feature = "parallel"))]
        out_a
            .data
            .iter_mut()
            .zip(out_b.data.iter_mut())
            .zip(out_c.data.iter_mut())
            .enumerate()
            .for_each(|(i, ((a, b), c))| kernel(i, a, b, c));

        self.finish();
        Ok(())
    }
}

/// Proof that the device has no outstanding work.
pub struct Idle<'a> {
    device: &'a mut Device,
}

impl Idle<'_> {
    pub fn release<T>(&mut self, buffer: DeviceBuffer<T>) {
        debug!("release `{}`", buffer.label);
        self.device.live_buffers -= 1;
        self.device.live_bytes -= buffer.byte_size();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_writes_every_lane() {
        let mut device = Device::new();
        let mut out = device.create_buffer::<u32>("out", 100);
        device
            .dispatch("square", 100, &mut out, |i, o| *o = (i * i) as u32)
            .unwrap();
        for (i, v) in out.as_slice().iter().enumerate() {
            assert_eq!(*v, (i * i) as u32);
        }
        assert_eq!(device.submitted(), 1);
        assert_eq!(device.pending(), 0);
    }

    #[test]
    fn test_lane_mismatch_rejected() {
        let mut device = Device::new();
        let mut out = device.create_buffer::<f32>("out", 10);
        let err = device.dispatch("bad", 11, &mut out, |_, _| {}).unwrap_err();
        assert!(matches!(err, DeviceError::LaneMismatch { lanes: 11, len: 10, .. }));
        assert_eq!(device.submitted(), 0, "rejected dispatch must not be queued");
    }

    #[test]
    fn test_lost_device_rejects_dispatch() {
        let mut device = Device::new();
        let mut out = device.create_buffer::<f32>("out", 4);
        device.lose();
        assert_eq!(
            device.dispatch("any", 4, &mut out, |_, o| *o = 1.0),
            Err(DeviceError::Lost)
        );
        assert!(out.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_dispatch_too_large() {
        let mut device = Device::with_max_lanes(8);
        let mut out = device.create_buffer::<f32>("out", 16);
        let err = device.dispatch("big", 16, &mut out, |_, _| {}).unwrap_err();
        assert!(matches!(err, DeviceError::DispatchTooLarge { lanes: 16, max: 8, .. }));
    }

    #[test]
    fn test_write_size_mismatch_keeps_contents() {
        let mut device = Device::new();
        let mut buf = device.create_buffer_init("buf", &[1u32, 2, 3]);
        assert!(buf.write(&[9, 9]).is_err());
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_release_balances_ledger() {
        let mut device = Device::new();
        let a = device.create_buffer::<f32>("a", 8);
        let b = device.create_buffer::<[f32; 2]>("b", 4);
        assert_eq!(device.live_buffers(), 2);
        assert_eq!(device.live_bytes(), 8 * 4 + 4 * 8);
        let mut idle = device.drain();
        idle.release(a);
        idle.release(b);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_bytes(), 0);
    }
}
