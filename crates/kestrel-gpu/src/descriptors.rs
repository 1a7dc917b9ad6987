//! Descriptor set layouts, pools and sets.
//!
//! A [`DescriptorPool`] owns the layouts registered with it; sets refer to
//! their layout through a [`LayoutId`] and keep a snapshot of its binding
//! table so writes can be validated without reaching back into the pool.
//! Writes are staged on the set and committed by [`DescriptorSet::flush`]
//! in a single driver call.

use std::collections::BTreeMap;

use ash::vk;

use crate::error::{GpuError, Result};

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    /// Array length (1 for plain bindings).
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
    pub flags: vk::DescriptorBindingFlags,
}

impl LayoutBinding {
    /// Whether the binding may be updated while a set using it is bound.
    pub fn is_update_after_bind(&self) -> bool {
        self.flags
            .contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND)
    }
}

/// Flags applied to bindless array bindings.
pub const BINDLESS_BINDING_FLAGS: vk::DescriptorBindingFlags = vk::DescriptorBindingFlags::from_raw(
    vk::DescriptorBindingFlags::PARTIALLY_BOUND.as_raw()
        | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND.as_raw()
        | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING.as_raw(),
);

/// Descriptor set layout builder.
///
/// The stage mask must be set with [`shader_stages`](Self::shader_stages)
/// before the first binding; it applies to every binding added after it.
#[derive(Debug, Default, Clone)]
pub struct DescriptorSetLayoutBuilder {
    stages: Option<vk::ShaderStageFlags>,
    bindings: BTreeMap<u32, LayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage mask for the bindings added from now on.
    pub fn shader_stages(mut self, stages: vk::ShaderStageFlags) -> Self {
        self.stages = Some(stages);
        self
    }

    fn insert(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        flags: vk::DescriptorBindingFlags,
    ) -> Result<Self> {
        let stages = self.stages.ok_or(GpuError::MissingStageMask(binding))?;
        if self.bindings.contains_key(&binding) {
            return Err(GpuError::DuplicateBinding(binding));
        }
        self.bindings.insert(
            binding,
            LayoutBinding {
                binding,
                descriptor_type,
                count: count.max(1),
                stages,
                flags,
            },
        );
        Ok(self)
    }

    /// Add a binding.
    pub fn add_binding(
        self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
    ) -> Result<Self> {
        self.insert(
            binding,
            descriptor_type,
            count,
            vk::DescriptorBindingFlags::empty(),
        )
    }

    /// Add a partially bound, update-after-bind array binding.
    pub fn add_bindless_binding(
        self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
    ) -> Result<Self> {
        self.insert(binding, descriptor_type, count, BINDLESS_BINDING_FLAGS)
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32) -> Result<Self> {
        self.add_binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1)
    }

    /// Add a storage buffer binding.
    pub fn storage_buffer(self, binding: u32) -> Result<Self> {
        self.add_binding(binding, vk::DescriptorType::STORAGE_BUFFER, 1)
    }

    /// Add a combined image sampler binding.
    pub fn combined_image_sampler(self, binding: u32) -> Result<Self> {
        self.add_binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1)
    }

    /// Add a storage image binding.
    pub fn storage_image(self, binding: u32) -> Result<Self> {
        self.add_binding(binding, vk::DescriptorType::STORAGE_IMAGE, 1)
    }

    /// Bindings in ascending index order.
    pub fn bindings(&self) -> impl Iterator<Item = &LayoutBinding> {
        self.bindings.values()
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<DescriptorSetLayout> {
        let vk_bindings: Vec<_> = self
            .bindings
            .values()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect();
        let binding_flags: Vec<_> = self.bindings.values().map(|b| b.flags).collect();
        let update_after_bind = self.bindings.values().any(LayoutBinding::is_update_after_bind);

        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let create_flags = if update_after_bind {
            vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL
        } else {
            vk::DescriptorSetLayoutCreateFlags::empty()
        };
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&vk_bindings)
            .flags(create_flags)
            .push_next(&mut flags_info);

        let handle = unsafe { device.create_descriptor_set_layout(&layout_info, None) }?;
        Ok(DescriptorSetLayout {
            handle,
            bindings: self.bindings,
            update_after_bind,
        })
    }
}

/// An immutable descriptor set layout and its binding table.
#[derive(Debug)]
pub struct DescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    bindings: BTreeMap<u32, LayoutBinding>,
    update_after_bind: bool,
}

impl DescriptorSetLayout {
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.get(&binding)
    }

    pub fn bindings(&self) -> &BTreeMap<u32, LayoutBinding> {
        &self.bindings
    }

    /// Whether any binding is update-after-bind.
    pub fn is_update_after_bind(&self) -> bool {
        self.update_after_bind
    }

    /// Descriptors needed per type to allocate one set.
    pub fn demand(&self) -> Vec<vk::DescriptorPoolSize> {
        pool_demand(self.bindings.values())
    }

    /// # Safety
    /// No set allocated with this layout may be in use.
    unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_descriptor_set_layout(self.handle, None) };
    }
}

fn pool_demand<'a>(bindings: impl Iterator<Item = &'a LayoutBinding>) -> Vec<vk::DescriptorPoolSize> {
    let mut demand: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        match demand.iter_mut().find(|size| size.ty == binding.descriptor_type) {
            Some(size) => size.descriptor_count += binding.count,
            None => demand.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: binding.count,
            }),
        }
    }
    demand
}

/// Handle of a layout registered with a [`DescriptorPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypeBudget {
    descriptor_type: vk::DescriptorType,
    capacity: u32,
    used: u32,
}

/// Fixed capacity bookkeeping of a descriptor pool.
///
/// The budget never grows: a request that does not fit is rejected with
/// [`GpuError::PoolExhausted`] and leaves the budget untouched.
#[derive(Debug, Clone)]
pub struct PoolBudget {
    max_sets: u32,
    sets: u32,
    types: Vec<TypeBudget>,
}

impl PoolBudget {
    pub fn new(max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> Self {
        let mut budget = Self {
            max_sets,
            sets: 0,
            types: Vec::with_capacity(sizes.len()),
        };
        for size in sizes {
            match budget
                .types
                .iter_mut()
                .find(|t| t.descriptor_type == size.ty)
            {
                Some(existing) => existing.capacity += size.descriptor_count,
                None => budget.types.push(TypeBudget {
                    descriptor_type: size.ty,
                    capacity: size.descriptor_count,
                    used: 0,
                }),
            }
        }
        budget
    }

    /// Charge one set with the given demand.
    pub fn reserve(&mut self, demand: &[vk::DescriptorPoolSize]) -> Result<()> {
        if self.sets >= self.max_sets {
            return Err(GpuError::PoolExhausted(format!(
                "all {} sets allocated",
                self.max_sets
            )));
        }
        for need in demand {
            let available = self
                .types
                .iter()
                .find(|t| t.descriptor_type == need.ty)
                .map_or(0, |t| t.capacity - t.used);
            if available < need.descriptor_count {
                return Err(GpuError::PoolExhausted(format!(
                    "{:?}: {} descriptors requested, {available} available",
                    need.ty, need.descriptor_count
                )));
            }
        }

        self.sets += 1;
        for need in demand {
            if let Some(t) = self.types.iter_mut().find(|t| t.descriptor_type == need.ty) {
                t.used += need.descriptor_count;
            }
        }
        Ok(())
    }

    /// Return a set's demand to the budget.
    pub fn release(&mut self, demand: &[vk::DescriptorPoolSize]) {
        self.sets = self.sets.saturating_sub(1);
        for need in demand {
            if let Some(t) = self.types.iter_mut().find(|t| t.descriptor_type == need.ty) {
                t.used = t.used.saturating_sub(need.descriptor_count);
            }
        }
    }

    /// Sets currently allocated.
    pub fn sets_allocated(&self) -> u32 {
        self.sets
    }

    /// Descriptors of `ty` still available.
    pub fn available(&self, ty: vk::DescriptorType) -> u32 {
        self.types
            .iter()
            .find(|t| t.descriptor_type == ty)
            .map_or(0, |t| t.capacity - t.used)
    }
}

/// Parameters for creating a descriptor pool.
#[derive(Debug, Clone)]
pub struct DescriptorPoolDesc {
    pub name: String,
    pub max_sets: u32,
    pub sizes: Vec<vk::DescriptorPoolSize>,
    /// Allow sets whose layouts carry update-after-bind bindings.
    pub update_after_bind: bool,
}

impl DescriptorPoolDesc {
    pub fn new(name: impl Into<String>, max_sets: u32) -> Self {
        Self {
            name: name.into(),
            max_sets,
            sizes: Vec::new(),
            update_after_bind: false,
        }
    }

    /// Add budget for `count` descriptors of `ty`.
    pub fn size(mut self, ty: vk::DescriptorType, count: u32) -> Self {
        self.sizes.push(vk::DescriptorPoolSize {
            ty,
            descriptor_count: count,
        });
        self
    }

    pub fn update_after_bind(mut self, enable: bool) -> Self {
        self.update_after_bind = enable;
        self
    }
}

/// Fixed capacity descriptor pool owning a registry of layouts.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    budget: PoolBudget,
    layouts: Vec<DescriptorSetLayout>,
    update_after_bind: bool,
    name: String,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, desc: &DescriptorPoolDesc) -> Result<Self> {
        let mut flags = vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        if desc.update_after_bind {
            flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(desc.max_sets)
            .pool_sizes(&desc.sizes)
            .flags(flags);

        let pool = unsafe { device.create_descriptor_pool(&create_info, None) }?;
        tracing::debug!(
            "Created descriptor pool '{}' ({} sets, {:?})",
            desc.name,
            desc.max_sets,
            desc.sizes
        );
        Ok(Self {
            pool,
            budget: PoolBudget::new(desc.max_sets, &desc.sizes),
            layouts: Vec::new(),
            update_after_bind: desc.update_after_bind,
            name: desc.name.clone(),
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    pub fn budget(&self) -> &PoolBudget {
        &self.budget
    }

    /// Take ownership of a layout; it is destroyed with the pool.
    pub fn register_layout(&mut self, layout: DescriptorSetLayout) -> LayoutId {
        self.layouts.push(layout);
        LayoutId(self.layouts.len() - 1)
    }

    pub fn layout(&self, id: LayoutId) -> Option<&DescriptorSetLayout> {
        self.layouts.get(id.0)
    }

    fn registered(&self, id: LayoutId) -> Result<&DescriptorSetLayout> {
        self.layout(id).ok_or_else(|| {
            GpuError::InvalidState(format!(
                "layout {id:?} is not registered with pool '{}'",
                self.name
            ))
        })
    }

    /// Allocate a set for a registered layout.
    ///
    /// # Safety
    /// The device must be the one the pool was created on.
    pub unsafe fn allocate(&mut self, device: &ash::Device, id: LayoutId) -> Result<DescriptorSet> {
        let layout = self.registered(id)?;
        if layout.is_update_after_bind() && !self.update_after_bind {
            return Err(GpuError::InvalidState(format!(
                "pool '{}' cannot hold update-after-bind layouts",
                self.name
            )));
        }
        let demand = layout.demand();
        let handle = layout.handle();
        let bindings = layout.bindings().clone();

        self.budget.reserve(&demand).map_err(|err| match err {
            GpuError::PoolExhausted(reason) => {
                GpuError::PoolExhausted(format!("pool '{}': {reason}", self.name))
            }
            other => other,
        })?;

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(std::slice::from_ref(&handle));

        match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => {
                let set = sets.into_iter().next().ok_or_else(|| {
                    GpuError::PoolExhausted(format!("pool '{}' returned no set", self.name))
                })?;
                Ok(DescriptorSet {
                    handle: set,
                    layout: id,
                    bindings,
                    pending: BTreeMap::new(),
                })
            }
            Err(err) => {
                self.budget.release(&demand);
                match err {
                    vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                        Err(GpuError::PoolExhausted(format!("pool '{}': {err}", self.name)))
                    }
                    other => Err(other.into()),
                }
            }
        }
    }

    /// Return a set to the pool.
    ///
    /// # Safety
    /// The set must not be in use by any pending command buffer.
    pub unsafe fn free(&mut self, device: &ash::Device, set: DescriptorSet) -> Result<()> {
        let demand = pool_demand(set.bindings.values());
        unsafe { device.free_descriptor_sets(self.pool, &[set.handle]) }?;
        self.budget.release(&demand);
        Ok(())
    }

    /// Destroy the pool and every registered layout.
    ///
    /// # Safety
    /// The device must be valid and no set from the pool may be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
            for layout in self.layouts.drain(..) {
                layout.destroy(device);
            }
        }
    }
}

/// Resource information for one descriptor write.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// A staged write of one array element.
#[derive(Debug, Clone, Copy)]
pub struct PendingWrite {
    pub binding: u32,
    pub element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub info: DescriptorInfo,
}

fn is_buffer_type(ty: vk::DescriptorType) -> bool {
    matches!(
        ty,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

/// A descriptor set and its staged writes.
pub struct DescriptorSet {
    handle: vk::DescriptorSet,
    layout: LayoutId,
    bindings: BTreeMap<u32, LayoutBinding>,
    pending: BTreeMap<(u32, u32), PendingWrite>,
}

impl DescriptorSet {
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    pub fn layout(&self) -> LayoutId {
        self.layout
    }

    pub fn binding(&self, binding: u32) -> Option<&LayoutBinding> {
        self.bindings.get(&binding)
    }

    /// Stage a write, replacing any staged write to the same element.
    pub fn stage(&mut self, write: PendingWrite) -> Result<()> {
        let declared = self
            .bindings
            .get(&write.binding)
            .ok_or(GpuError::UnknownBinding(write.binding))?;
        if declared.descriptor_type != write.descriptor_type {
            return Err(GpuError::DescriptorTypeMismatch {
                binding: write.binding,
                expected: declared.descriptor_type,
                actual: write.descriptor_type,
            });
        }
        let info_matches = match write.info {
            DescriptorInfo::Buffer(_) => is_buffer_type(write.descriptor_type),
            DescriptorInfo::Image(_) => !is_buffer_type(write.descriptor_type),
        };
        if !info_matches {
            return Err(GpuError::InvalidState(format!(
                "binding {} is {:?} but the write carries {:?}",
                write.binding, write.descriptor_type, write.info
            )));
        }
        if write.element >= declared.count {
            return Err(GpuError::OutOfBounds {
                name: format!("binding {}", write.binding),
                offset: u64::from(write.element),
                len: 1,
                size: u64::from(declared.count),
            });
        }

        self.pending.insert((write.binding, write.element), write);
        Ok(())
    }

    /// Stage a uniform buffer write.
    pub fn write_uniform_buffer(
        &mut self,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    ) -> Result<()> {
        self.stage(PendingWrite {
            binding,
            element: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            info: DescriptorInfo::Buffer(info),
        })
    }

    /// Stage a storage buffer write.
    pub fn write_storage_buffer(
        &mut self,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    ) -> Result<()> {
        self.stage(PendingWrite {
            binding,
            element: 0,
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
            info: DescriptorInfo::Buffer(info),
        })
    }

    /// Stage a combined image sampler write.
    pub fn write_combined_image(
        &mut self,
        binding: u32,
        info: vk::DescriptorImageInfo,
    ) -> Result<()> {
        self.stage(PendingWrite {
            binding,
            element: 0,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            info: DescriptorInfo::Image(info),
        })
    }

    /// Number of staged writes.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Commit every staged write in one `vkUpdateDescriptorSets` call.
    ///
    /// Returns the number of writes committed.
    ///
    /// # Safety
    /// Plain bindings must not be in use by a pending command buffer;
    /// update-after-bind bindings may be.
    pub unsafe fn flush(&mut self, device: &ash::Device) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let staged: Vec<PendingWrite> = std::mem::take(&mut self.pending).into_values().collect();
        let writes: Vec<vk::WriteDescriptorSet> = staged
            .iter()
            .map(|w| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(self.handle)
                    .dst_binding(w.binding)
                    .dst_array_element(w.element)
                    .descriptor_type(w.descriptor_type);
                match &w.info {
                    DescriptorInfo::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                    DescriptorInfo::Image(info) => write.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        unsafe { device.update_descriptor_sets(&writes, &[]) };
        writes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages() -> vk::ShaderStageFlags {
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    }

    #[test]
    fn binding_before_stage_mask_is_rejected() {
        let err = DescriptorSetLayoutBuilder::new().uniform_buffer(0).unwrap_err();
        assert!(matches!(err, GpuError::MissingStageMask(0)));
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let err = DescriptorSetLayoutBuilder::new()
            .shader_stages(stages())
            .uniform_buffer(0)
            .and_then(|b| b.storage_buffer(0))
            .unwrap_err();
        assert!(matches!(err, GpuError::DuplicateBinding(0)));
    }

    #[test]
    fn stage_mask_applies_to_later_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .shader_stages(vk::ShaderStageFlags::VERTEX)
            .uniform_buffer(0)
            .unwrap()
            .shader_stages(vk::ShaderStageFlags::FRAGMENT)
            .add_bindless_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1024)
            .unwrap();
        let bindings: Vec<_> = builder.bindings().copied().collect();
        assert_eq!(bindings[0].stages, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[1].stages, vk::ShaderStageFlags::FRAGMENT);
        assert!(bindings[1].is_update_after_bind());
        assert!(bindings[1]
            .flags
            .contains(vk::DescriptorBindingFlags::PARTIALLY_BOUND));
        assert!(!bindings[0].is_update_after_bind());
    }

    #[test]
    fn pool_budget_rejects_without_partial_charge() {
        let mut budget = PoolBudget::new(
            2,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 3,
            }],
        );
        let demand = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 1,
            },
        ];
        assert!(matches!(
            budget.reserve(&demand),
            Err(GpuError::PoolExhausted(_))
        ));
        assert_eq!(budget.available(vk::DescriptorType::UNIFORM_BUFFER), 3);
        assert_eq!(budget.sets_allocated(), 0);

        budget.reserve(&demand[..1]).unwrap();
        assert!(budget.reserve(&demand[..1]).is_err());
        budget.release(&demand[..1]);
        assert_eq!(budget.available(vk::DescriptorType::UNIFORM_BUFFER), 3);
    }

    #[test]
    fn pool_budget_limits_set_count() {
        let mut budget = PoolBudget::new(1, &[]);
        budget.reserve(&[]).unwrap();
        assert!(matches!(budget.reserve(&[]), Err(GpuError::PoolExhausted(_))));
    }

    fn test_set() -> DescriptorSet {
        let builder = DescriptorSetLayoutBuilder::new()
            .shader_stages(stages())
            .uniform_buffer(0)
            .unwrap()
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4)
            .unwrap();
        DescriptorSet {
            handle: vk::DescriptorSet::null(),
            layout: LayoutId(0),
            bindings: builder.bindings().map(|b| (b.binding, *b)).collect(),
            pending: BTreeMap::new(),
        }
    }

    #[test]
    fn writes_are_validated_against_layout() {
        let mut set = test_set();
        assert!(matches!(
            set.write_uniform_buffer(7, vk::DescriptorBufferInfo::default()),
            Err(GpuError::UnknownBinding(7))
        ));
        assert!(matches!(
            set.write_storage_buffer(0, vk::DescriptorBufferInfo::default()),
            Err(GpuError::DescriptorTypeMismatch { binding: 0, .. })
        ));
        assert!(set
            .stage(PendingWrite {
                binding: 1,
                element: 4,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                info: DescriptorInfo::Image(vk::DescriptorImageInfo::default()),
            })
            .is_err());
        assert_eq!(set.pending_count(), 0);
    }

    #[test]
    fn repeated_writes_to_one_element_coalesce() {
        let mut set = test_set();
        set.write_uniform_buffer(0, vk::DescriptorBufferInfo::default())
            .unwrap();
        set.write_uniform_buffer(0, vk::DescriptorBufferInfo::default().range(64))
            .unwrap();
        set.write_combined_image(1, vk::DescriptorImageInfo::default())
            .unwrap();
        assert_eq!(set.pending_count(), 2);
    }
}
