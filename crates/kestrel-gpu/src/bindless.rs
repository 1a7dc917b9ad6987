//! Bindless descriptor arrays.
//!
//! [`BindlessTable`] is the slot bookkeeping: every array element of a
//! bindless binding is free, reserved, or bound to exactly one resource.
//! [`BindlessDescriptorSet`] pairs it with a [`DescriptorSet`] and pushes the
//! accumulated writes to the device on [`flush`](BindlessDescriptorSet::flush).

use std::collections::{BTreeMap, BTreeSet};

use ash::vk;

use crate::buffer::Buffer;
use crate::deferred::DeferredQueue;
use crate::descriptors::{DescriptorInfo, DescriptorSet, LayoutBinding, PendingWrite};
use crate::error::{GpuError, Result};
use crate::texture::Texture;

/// Which slot a reservation or write should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRequest {
    /// The lowest free slot.
    Auto,
    /// A caller-chosen slot.
    Index(u32),
}

/// Occupancy of one array element.
#[derive(Debug, Clone, Copy)]
pub enum Slot {
    Free,
    /// Claimed without a resource, e.g. to embed the index in push constants.
    Reserved,
    Bound(DescriptorInfo),
    /// Released by its owner but possibly still read by frames in flight.
    Retiring,
}

#[derive(Debug)]
struct BindingSlots {
    descriptor_type: vk::DescriptorType,
    slots: Vec<Slot>,
    free: BTreeSet<u32>,
}

impl BindingSlots {
    fn new(descriptor_type: vk::DescriptorType, capacity: u32) -> Self {
        Self {
            descriptor_type,
            slots: vec![Slot::Free; capacity as usize],
            free: (0..capacity).collect(),
        }
    }

    fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    fn claim(&mut self, slot: u32, state: Slot) {
        self.slots[slot as usize] = state;
        self.free.remove(&slot);
    }
}

/// Slot allocator and pending write list for the bindless bindings of a set.
#[derive(Debug)]
pub struct BindlessTable {
    bindings: BTreeMap<u32, BindingSlots>,
    pending: BTreeMap<(u32, u32), PendingWrite>,
    retiring: DeferredQueue<(u32, u32)>,
}

impl BindlessTable {
    /// Track the given array bindings. Retired slots return to the free list
    /// `frames_in_flight` frames after their release.
    pub fn new<'a>(
        bindings: impl IntoIterator<Item = &'a LayoutBinding>,
        frames_in_flight: usize,
    ) -> Self {
        Self {
            bindings: bindings
                .into_iter()
                .map(|b| (b.binding, BindingSlots::new(b.descriptor_type, b.count)))
                .collect(),
            pending: BTreeMap::new(),
            retiring: DeferredQueue::new(frames_in_flight),
        }
    }

    fn slots(&self, binding: u32) -> Result<&BindingSlots> {
        self.bindings
            .get(&binding)
            .ok_or(GpuError::UnknownBinding(binding))
    }

    fn slots_mut(&mut self, binding: u32) -> Result<&mut BindingSlots> {
        self.bindings
            .get_mut(&binding)
            .ok_or(GpuError::UnknownBinding(binding))
    }

    /// Array capacity of a binding.
    pub fn capacity(&self, binding: u32) -> Result<u32> {
        Ok(self.slots(binding)?.capacity())
    }

    /// Lowest free slot of a binding.
    pub fn first_free_index(&self, binding: u32) -> Result<u32> {
        let slots = self.slots(binding)?;
        slots
            .free
            .first()
            .copied()
            .ok_or(GpuError::DescriptorSetFull {
                binding,
                capacity: slots.capacity(),
            })
    }

    /// Whether a slot is reserved, bound or retiring.
    pub fn is_index_allocated(&self, binding: u32, slot: u32) -> bool {
        self.bindings
            .get(&binding)
            .and_then(|s| s.slots.get(slot as usize))
            .is_some_and(|s| !matches!(s, Slot::Free))
    }

    /// Resource currently bound to a slot.
    pub fn bound_info(&self, binding: u32, slot: u32) -> Option<DescriptorInfo> {
        match self.bindings.get(&binding)?.slots.get(slot as usize)? {
            Slot::Bound(info) => Some(*info),
            _ => None,
        }
    }

    /// Resolve a request to an in-range slot, `None` for out of range.
    fn resolve(&self, binding: u32, request: SlotRequest) -> Result<Option<u32>> {
        match request {
            SlotRequest::Auto => self.first_free_index(binding).map(Some),
            SlotRequest::Index(slot) => {
                let capacity = self.capacity(binding)?;
                if slot < capacity {
                    Ok(Some(slot))
                } else {
                    tracing::warn!(
                        "Bindless slot {slot} is outside binding {binding} (capacity {capacity}), ignoring"
                    );
                    Ok(None)
                }
            }
        }
    }

    /// Mark a slot occupied without writing a resource.
    ///
    /// Auto requests fail with [`GpuError::DescriptorSetFull`] when every
    /// slot is taken; an out-of-range explicit slot is a warning and `None`.
    pub fn reserve_index(&mut self, binding: u32, request: SlotRequest) -> Result<Option<u32>> {
        let Some(slot) = self.resolve(binding, request)? else {
            return Ok(None);
        };
        let slots = self.slots_mut(binding)?;
        if matches!(slots.slots[slot as usize], Slot::Free) {
            slots.claim(slot, Slot::Reserved);
        }
        Ok(Some(slot))
    }

    /// Bind a resource to a slot and stage its write.
    ///
    /// An occupied slot, reserved or bound, is left untouched unless
    /// `overwrite` is set; the call then returns the slot unchanged. Filling
    /// a reserved slot therefore takes `overwrite = true`.
    pub fn write(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        info: DescriptorInfo,
        overwrite: bool,
        request: SlotRequest,
    ) -> Result<Option<u32>> {
        let declared = self.slots(binding)?.descriptor_type;
        if declared != descriptor_type {
            return Err(GpuError::DescriptorTypeMismatch {
                binding,
                expected: declared,
                actual: descriptor_type,
            });
        }
        let Some(slot) = self.resolve(binding, request)? else {
            return Ok(None);
        };

        let slots = self.slots_mut(binding)?;
        match slots.slots[slot as usize] {
            Slot::Retiring => {
                tracing::warn!(
                    "Bindless slot {slot} of binding {binding} is retiring, write ignored"
                );
                return Ok(None);
            }
            Slot::Free => {}
            Slot::Reserved | Slot::Bound(_) if !overwrite => return Ok(Some(slot)),
            Slot::Reserved | Slot::Bound(_) => {}
        }
        slots.claim(slot, Slot::Bound(info));
        self.pending.insert(
            (binding, slot),
            PendingWrite {
                binding,
                element: slot,
                descriptor_type,
                info,
            },
        );
        Ok(Some(slot))
    }

    /// Release a slot and drop any staged write for it.
    ///
    /// Returns whether the slot was in range. The descriptor itself is left
    /// as is; partially bound arrays tolerate stale elements nobody indexes.
    pub fn free_index(&mut self, binding: u32, slot: u32) -> Result<bool> {
        let slots = self.slots_mut(binding)?;
        if slot >= slots.capacity() {
            tracing::warn!(
                "Cannot free bindless slot {slot}: binding {binding} has capacity {}",
                slots.capacity()
            );
            return Ok(false);
        }
        slots.slots[slot as usize] = Slot::Free;
        slots.free.insert(slot);
        self.pending.remove(&(binding, slot));
        Ok(true)
    }

    /// Release a slot that frames in flight may still read.
    ///
    /// The slot stays occupied until [`release_retired`](Self::release_retired)
    /// runs `frames_in_flight` frames after `frame_number`. Returns whether
    /// the slot was occupied and in range.
    pub fn retire_index(&mut self, binding: u32, slot: u32, frame_number: u64) -> Result<bool> {
        let slots = self.slots_mut(binding)?;
        if slot >= slots.capacity() {
            tracing::warn!(
                "Cannot retire bindless slot {slot}: binding {binding} has capacity {}",
                slots.capacity()
            );
            return Ok(false);
        }
        if matches!(slots.slots[slot as usize], Slot::Free | Slot::Retiring) {
            return Ok(false);
        }
        slots.slots[slot as usize] = Slot::Retiring;
        self.pending.remove(&(binding, slot));
        self.retiring.queue((binding, slot), frame_number);
        Ok(true)
    }

    /// Free every retired slot no frame in flight can still read.
    ///
    /// Call after the current slot's fence wait. Returns the number of
    /// slots freed.
    pub fn release_retired(&mut self, current_frame_number: u64) -> Result<usize> {
        let mut matured = Vec::new();
        self.retiring.process(current_frame_number, |entry| {
            matured.push(entry);
            Ok(())
        })?;

        let mut freed = 0;
        for (binding, slot) in matured {
            let slots = self.slots_mut(binding)?;
            if matches!(slots.slots[slot as usize], Slot::Retiring) {
                slots.slots[slot as usize] = Slot::Free;
                slots.free.insert(slot);
                freed += 1;
            }
        }
        Ok(freed)
    }

    /// Slots waiting for the frames in flight to finish.
    pub fn retiring_count(&self) -> usize {
        self.retiring.pending_count()
    }

    /// Number of staged writes.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drain the staged writes in (binding, slot) order.
    pub fn take_pending(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.pending).into_values().collect()
    }
}

/// A descriptor set whose bindless bindings are managed slot by slot.
pub struct BindlessDescriptorSet {
    set: DescriptorSet,
    table: BindlessTable,
}

impl BindlessDescriptorSet {
    /// Manage the update-after-bind bindings of `set`.
    pub fn new(
        set: DescriptorSet,
        bindings: &BTreeMap<u32, LayoutBinding>,
        frames_in_flight: usize,
    ) -> Self {
        let table = BindlessTable::new(
            bindings
                .values()
                .filter(|binding| binding.is_update_after_bind()),
            frames_in_flight,
        );
        Self { set, table }
    }

    pub fn handle(&self) -> vk::DescriptorSet {
        self.set.handle()
    }

    /// The underlying set, e.g. to stage writes to its plain bindings.
    pub fn set_mut(&mut self) -> &mut DescriptorSet {
        &mut self.set
    }

    pub fn table(&self) -> &BindlessTable {
        &self.table
    }

    pub fn reserve_index(&mut self, binding: u32, request: SlotRequest) -> Result<Option<u32>> {
        self.table.reserve_index(binding, request)
    }

    /// Bind a sampled texture (combined image sampler binding).
    pub fn write_texture(
        &mut self,
        binding: u32,
        texture: &Texture,
        overwrite: bool,
        request: SlotRequest,
    ) -> Result<Option<u32>> {
        self.write_image(
            binding,
            texture.descriptor_info(),
            overwrite,
            request,
        )
    }

    pub fn write_image(
        &mut self,
        binding: u32,
        info: vk::DescriptorImageInfo,
        overwrite: bool,
        request: SlotRequest,
    ) -> Result<Option<u32>> {
        self.table.write(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorInfo::Image(info),
            overwrite,
            request,
        )
    }

    /// Bind a whole buffer (storage buffer binding).
    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: &Buffer,
        overwrite: bool,
        request: SlotRequest,
    ) -> Result<Option<u32>> {
        self.table.write(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            DescriptorInfo::Buffer(buffer.descriptor_info()),
            overwrite,
            request,
        )
    }

    /// Release a slot once the frames that may read it have completed.
    pub fn retire_index(&mut self, binding: u32, slot: u32, frame_number: u64) -> Result<bool> {
        self.table.retire_index(binding, slot, frame_number)
    }

    /// Free the retired slots that have matured by `current_frame_number`.
    pub fn release_retired(&mut self, current_frame_number: u64) -> Result<usize> {
        self.table.release_retired(current_frame_number)
    }

    /// Release a slot immediately; with `flush_now` the remaining writes are
    /// pushed too. Only for slots no pending command buffer reads.
    ///
    /// # Safety
    /// See [`flush`](Self::flush).
    pub unsafe fn free_index(
        &mut self,
        device: &ash::Device,
        binding: u32,
        slot: u32,
        flush_now: bool,
    ) -> Result<bool> {
        let freed = self.table.free_index(binding, slot)?;
        if freed && flush_now {
            unsafe { self.flush(device) }?;
        }
        Ok(freed)
    }

    /// Push every staged write to the device in one update call.
    ///
    /// # Safety
    /// Only update-after-bind bindings may be written while the set is in
    /// use by a pending command buffer.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn flush(&mut self, device: &ash::Device) -> Result<usize> {
        for write in self.table.take_pending() {
            self.set.stage(write)?;
        }
        Ok(unsafe { self.set.flush(device) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    const TEXTURES: u32 = 2;
    const BUFFERS: u32 = 3;
    const FRAMES_IN_FLIGHT: usize = 2;

    fn table(capacity: u32) -> BindlessTable {
        let bindings = [
            LayoutBinding {
                binding: TEXTURES,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                count: capacity,
                stages: vk::ShaderStageFlags::FRAGMENT,
                flags: crate::descriptors::BINDLESS_BINDING_FLAGS,
            },
            LayoutBinding {
                binding: BUFFERS,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                count: capacity,
                stages: vk::ShaderStageFlags::FRAGMENT,
                flags: crate::descriptors::BINDLESS_BINDING_FLAGS,
            },
        ];
        BindlessTable::new(&bindings, FRAMES_IN_FLIGHT)
    }

    fn image(id: u64) -> DescriptorInfo {
        DescriptorInfo::Image(vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(id),
            image_view: vk::ImageView::from_raw(id),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
    }

    fn view_of(info: Option<DescriptorInfo>) -> Option<vk::ImageView> {
        match info? {
            DescriptorInfo::Image(info) => Some(info.image_view),
            DescriptorInfo::Buffer(_) => None,
        }
    }

    fn write_image(
        table: &mut BindlessTable,
        id: u64,
        overwrite: bool,
        request: SlotRequest,
    ) -> Result<Option<u32>> {
        table.write(
            TEXTURES,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            image(id),
            overwrite,
            request,
        )
    }

    #[test]
    fn auto_reservation_exhausts_after_capacity() {
        let mut table = table(4);
        for expected in 0..4 {
            assert_eq!(
                table.reserve_index(TEXTURES, SlotRequest::Auto).unwrap(),
                Some(expected)
            );
        }
        assert!(matches!(
            table.reserve_index(TEXTURES, SlotRequest::Auto),
            Err(GpuError::DescriptorSetFull {
                binding: TEXTURES,
                capacity: 4
            })
        ));

        assert!(table.free_index(TEXTURES, 2).unwrap());
        assert_eq!(
            table.reserve_index(TEXTURES, SlotRequest::Auto).unwrap(),
            Some(2)
        );
    }

    #[test]
    fn write_without_overwrite_is_idempotent() {
        let mut table = table(8);
        let first = write_image(&mut table, 1, false, SlotRequest::Index(5)).unwrap();
        let second = write_image(&mut table, 2, false, SlotRequest::Index(5)).unwrap();
        assert_eq!(first, Some(5));
        assert_eq!(second, Some(5));
        assert_eq!(
            view_of(table.bound_info(TEXTURES, 5)),
            Some(vk::ImageView::from_raw(1))
        );
        assert_eq!(table.pending_count(), 1);

        let third = write_image(&mut table, 3, true, SlotRequest::Index(5)).unwrap();
        assert_eq!(third, Some(5));
        assert_eq!(
            view_of(table.bound_info(TEXTURES, 5)),
            Some(vk::ImageView::from_raw(3))
        );
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn reserved_slot_needs_overwrite_to_bind() {
        let mut table = table(4);
        let slot = table
            .reserve_index(TEXTURES, SlotRequest::Auto)
            .unwrap()
            .unwrap();
        assert!(table.is_index_allocated(TEXTURES, slot));

        assert_eq!(
            write_image(&mut table, 9, false, SlotRequest::Index(slot)).unwrap(),
            Some(slot)
        );
        assert!(table.bound_info(TEXTURES, slot).is_none());
        assert_eq!(table.pending_count(), 0);

        write_image(&mut table, 9, true, SlotRequest::Index(slot)).unwrap();
        assert_eq!(
            view_of(table.bound_info(TEXTURES, slot)),
            Some(vk::ImageView::from_raw(9))
        );
        assert_eq!(table.pending_count(), 1);
        // Auto skips the reserved-then-bound slot.
        assert_eq!(
            write_image(&mut table, 10, false, SlotRequest::Auto).unwrap(),
            Some(1)
        );
    }

    fn buffer(id: u64) -> DescriptorInfo {
        DescriptorInfo::Buffer(vk::DescriptorBufferInfo {
            buffer: vk::Buffer::from_raw(id),
            offset: 0,
            range: 256,
        })
    }

    fn write_buffer(
        table: &mut BindlessTable,
        id: u64,
        overwrite: bool,
        request: SlotRequest,
    ) -> Result<Option<u32>> {
        table.write(
            BUFFERS,
            vk::DescriptorType::STORAGE_BUFFER,
            buffer(id),
            overwrite,
            request,
        )
    }

    fn buffer_of(info: Option<DescriptorInfo>) -> Option<vk::Buffer> {
        match info? {
            DescriptorInfo::Buffer(info) => Some(info.buffer),
            DescriptorInfo::Image(_) => None,
        }
    }

    #[test]
    fn storage_buffer_writes_reuse_slots() {
        let mut table = table(4);
        assert_eq!(
            write_buffer(&mut table, 1, false, SlotRequest::Auto).unwrap(),
            Some(0)
        );
        assert_eq!(
            write_buffer(&mut table, 2, false, SlotRequest::Auto).unwrap(),
            Some(1)
        );
        assert_eq!(
            write_buffer(&mut table, 3, false, SlotRequest::Index(1)).unwrap(),
            Some(1)
        );
        assert_eq!(
            buffer_of(table.bound_info(BUFFERS, 1)),
            Some(vk::Buffer::from_raw(2))
        );
        // Texture slots are tracked separately.
        assert_eq!(table.first_free_index(TEXTURES).unwrap(), 0);

        let pending = table.take_pending();
        assert_eq!(pending.len(), 2);
        assert!(pending
            .iter()
            .all(|w| w.binding == BUFFERS
                && w.descriptor_type == vk::DescriptorType::STORAGE_BUFFER));
        assert!(matches!(
            pending[1].info,
            DescriptorInfo::Buffer(info) if info.buffer == vk::Buffer::from_raw(2) && info.range == 256
        ));

        assert!(table.free_index(BUFFERS, 0).unwrap());
        assert_eq!(
            write_buffer(&mut table, 4, false, SlotRequest::Auto).unwrap(),
            Some(0)
        );
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn retired_slot_is_freed_after_frames_in_flight() {
        let mut table = table(2);
        write_image(&mut table, 1, false, SlotRequest::Auto).unwrap();
        write_image(&mut table, 2, false, SlotRequest::Auto).unwrap();
        assert!(table.retire_index(TEXTURES, 1, 10).unwrap());
        assert_eq!(table.pending_count(), 1);
        assert_eq!(table.retiring_count(), 1);

        for frame in 10..=10 + FRAMES_IN_FLIGHT as u64 {
            assert_eq!(table.release_retired(frame).unwrap(), 0);
            assert!(matches!(
                table.reserve_index(TEXTURES, SlotRequest::Auto),
                Err(GpuError::DescriptorSetFull { .. })
            ));
            // Explicit writes cannot land on a retiring slot either.
            assert_eq!(
                write_image(&mut table, 3, true, SlotRequest::Index(1)).unwrap(),
                None
            );
        }

        assert_eq!(
            table.release_retired(11 + FRAMES_IN_FLIGHT as u64).unwrap(),
            1
        );
        assert_eq!(table.retiring_count(), 0);
        assert_eq!(
            table.reserve_index(TEXTURES, SlotRequest::Auto).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn retiring_a_free_slot_is_a_no_op() {
        let mut table = table(2);
        assert!(!table.retire_index(TEXTURES, 0, 0).unwrap());
        assert!(!table.retire_index(TEXTURES, 9, 0).unwrap());
        assert_eq!(table.retiring_count(), 0);
    }

    #[test]
    fn out_of_range_requests_are_ignored() {
        let mut table = table(4);
        assert_eq!(
            table.reserve_index(TEXTURES, SlotRequest::Index(4)).unwrap(),
            None
        );
        assert_eq!(
            write_image(&mut table, 1, true, SlotRequest::Index(99)).unwrap(),
            None
        );
        assert!(!table.free_index(TEXTURES, 4).unwrap());
        assert_eq!(table.first_free_index(TEXTURES).unwrap(), 0);
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn free_drops_pending_write() {
        let mut table = table(4);
        write_image(&mut table, 1, false, SlotRequest::Auto).unwrap();
        write_image(&mut table, 2, false, SlotRequest::Auto).unwrap();
        assert!(table.free_index(TEXTURES, 0).unwrap());

        let pending = table.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].element, 1);
        assert_eq!(table.pending_count(), 0);
        assert!(!table.is_index_allocated(TEXTURES, 0));
    }

    #[test]
    fn writes_are_type_checked() {
        let mut table = table(4);
        let err = table
            .write(
                BUFFERS,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                image(1),
                false,
                SlotRequest::Auto,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            GpuError::DescriptorTypeMismatch {
                binding: BUFFERS,
                ..
            }
        ));
        assert!(matches!(
            table.reserve_index(7, SlotRequest::Auto),
            Err(GpuError::UnknownBinding(7))
        ));
    }

    #[test]
    fn no_slot_is_handed_out_twice() {
        let mut table = table(16);
        let mut live = BTreeSet::new();
        // Deterministic pseudo-random sequence of reserve, write and free.
        let mut state = 0x2545_f491_u32;
        for step in 0..2000u64 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            match state % 3 {
                0 => match table.reserve_index(TEXTURES, SlotRequest::Auto) {
                    Ok(Some(slot)) => assert!(live.insert(slot), "slot {slot} reused"),
                    Ok(None) => unreachable!(),
                    Err(_) => assert_eq!(live.len(), 16),
                },
                1 => match write_image(&mut table, step, false, SlotRequest::Auto) {
                    Ok(Some(slot)) => assert!(live.insert(slot), "slot {slot} reused"),
                    Ok(None) => unreachable!(),
                    Err(_) => assert_eq!(live.len(), 16),
                },
                _ => {
                    let slot = state % 16;
                    table.free_index(TEXTURES, slot).unwrap();
                    live.remove(&slot);
                }
            }
            for slot in 0..16 {
                assert_eq!(table.is_index_allocated(TEXTURES, slot), live.contains(&slot));
            }
        }
    }
}
