//! Command pools, recording helpers and submission.

use crate::error::{GpuError, Result};
use ash::vk;
use parking_lot::Mutex;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None) }?;

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(
        &self,
        device: &ash::Device,
        level: vk::CommandBufferLevel,
    ) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }?;
        buffers
            .into_iter()
            .next()
            .ok_or(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
    }

    /// Allocate multiple command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level)
            .command_buffer_count(count);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }?;
        Ok(buffers)
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info) }?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd) }?;
    Ok(())
}

/// A semaphore wait or signal at a pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreStage {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

/// Submit one command buffer with synchronization2 semaphore stages.
///
/// # Safety
/// All handles must be valid and `cmd` must be in the executable state.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_command_buffer(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: &[SemaphoreStage],
    signal: &[SemaphoreStage],
    fence: vk::Fence,
) -> Result<()> {
    let to_info = |s: &SemaphoreStage| {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(s.semaphore)
            .stage_mask(s.stage)
    };
    let wait_infos: Vec<_> = wait.iter().map(to_info).collect();
    let signal_infos: Vec<_> = signal.iter().map(to_info).collect();
    let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];

    let submit_info = vk::SubmitInfo2::default()
        .wait_semaphore_infos(&wait_infos)
        .command_buffer_infos(&cmd_infos)
        .signal_semaphore_infos(&signal_infos);

    unsafe { device.queue_submit2(queue, &[submit_info], fence) }?;
    Ok(())
}

/// Blocking one-shot submission path used for uploads and layout changes.
///
/// Every call allocates a command buffer, records `f`, submits it, waits for
/// the queue to go idle and frees the buffer. It stalls the queue and must not
/// be used per draw call.
pub struct ImmediateSubmit {
    pool: CommandPool,
    queue: vk::Queue,
}

impl ImmediateSubmit {
    /// Create the path on the given queue.
    ///
    /// # Safety
    /// The device must be valid and `queue` must belong to `queue_family`.
    pub unsafe fn new(device: &ash::Device, queue_family: u32, queue: vk::Queue) -> Result<Self> {
        let pool = unsafe {
            CommandPool::new(device, queue_family, vk::CommandPoolCreateFlags::TRANSIENT)
        }?;
        Ok(Self { pool, queue })
    }

    /// Record and execute `f`, blocking until the GPU has finished.
    ///
    /// `queue_lock` is held across the submit and the idle wait.
    ///
    /// # Safety
    /// The device must be the one this path was created with.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn execute<F>(&self, device: &ash::Device, queue_lock: &Mutex<()>, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let cmd = unsafe {
            self.pool
                .allocate_command_buffer(device, vk::CommandBufferLevel::PRIMARY)
        }?;

        let result = (|| -> Result<()> {
            unsafe {
                begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            }?;
            f(device, cmd)?;
            unsafe { end_command_buffer(device, cmd) }?;

            let cmd_buffers = [cmd];
            let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
            let _queue = queue_lock.lock();
            unsafe {
                device.queue_submit(self.queue, &[submit_info], vk::Fence::null())?;
                device.queue_wait_idle(self.queue)?;
            }
            Ok(())
        })();

        unsafe { device.free_command_buffers(self.pool.handle(), &[cmd]) };

        result
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// No submission from this path may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { self.pool.destroy(device) };
    }
}
