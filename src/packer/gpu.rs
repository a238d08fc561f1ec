//! GPU bit-packing path.
//!
//! A single compute pipeline packs the whole stack in one dispatch, one
//! invocation per output pixel. All buffers are allocated once for a
//! fixed geometry; the calibration tables are re-uploaded on every pack
//! so table swaps need no rebuild. Readback is synchronous-blocking: a
//! packed frame is complete before `pack` returns.

use bytemuck::{Pod, Zeroable};
use log::debug;
use std::sync::mpsc;

use crate::codes::CodeTable;
use crate::error::{GpuError, GpuResult};
use crate::frame::{PackedFrame, PhaseStack, MAX_PLANES, PACKED_BPP};
use crate::quantize::QuantizationTable;

const WORKGROUP_DIM: usize = 16;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PackParams {
    width: u32,
    height: u32,
    planes: u32,
    _padding: u32,
}

pub struct GpuPacker {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    phase_buf: wgpu::Buffer,
    lut_buf: wgpu::Buffer,
    code_buf: wgpu::Buffer,
    param_buf: wgpu::Buffer,
    out_buf: wgpu::Buffer,
    staging_buf: wgpu::Buffer,
    adapter_name: String,
    width: usize,
    height: usize,
    out_bytes: usize,
}

impl GpuPacker {
    /// Acquires a device and builds the fixed pipeline and buffers for
    /// packing `width` x `height` logical frames.
    pub fn new(width: usize, height: usize) -> GpuResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;
        let adapter_name = adapter.get_info().name;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("plm-packer"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pack"),
            source: wgpu::ShaderSource::Wgsl(include_str!("pack.wgsl").into()),
        });

        let storage_read = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("pack_bind_group_layout"),
                entries: &[
                    storage_read(0),
                    storage_read(1),
                    storage_read(2),
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 4,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pack_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("pack"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("pack"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let storage_buf = |label, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let out_bytes = PACKED_BPP * 2 * width * 2 * height;
        let phase_buf = storage_buf("phase", MAX_PLANES * width * height * 4);
        let lut_buf = storage_buf("lut", crate::quantize::LUT_BREAKPOINTS * 4);
        let code_buf = storage_buf("codes", 64 * 4);
        let param_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("params"),
            size: std::mem::size_of::<PackParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let out_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texels"),
            size: out_bytes as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: out_bytes as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pack_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: phase_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lut_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: code_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: param_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: out_buf.as_entire_binding(),
                },
            ],
        });

        debug!("GPU packer ready on {adapter_name} ({width}x{height} logical)");
        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group,
            phase_buf,
            lut_buf,
            code_buf,
            param_buf,
            out_buf,
            staging_buf,
            adapter_name,
            width,
            height,
            out_bytes,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Dispatches one pack and blocks until the frame is read back.
    pub fn pack(
        &self,
        stack: &PhaseStack,
        lut: &QuantizationTable,
        codes: &CodeTable,
    ) -> GpuResult<PackedFrame> {
        debug_assert_eq!(stack.width(), self.width);
        debug_assert_eq!(stack.height(), self.height);

        let params = PackParams {
            width: self.width as u32,
            height: self.height as u32,
            planes: stack.planes() as u32,
            _padding: 0,
        };
        let mut words = [0u32; 64];
        for (level, code) in codes.codes().iter().enumerate() {
            for (corner, &bit) in code.iter().enumerate() {
                words[4 * level + corner] = u32::from(bit);
            }
        }
        if stack.planes() > 0 {
            self.queue
                .write_buffer(&self.phase_buf, 0, bytemuck::cast_slice(stack.values()));
        }
        self.queue
            .write_buffer(&self.lut_buf, 0, bytemuck::cast_slice(lut.breakpoints()));
        self.queue
            .write_buffer(&self.code_buf, 0, bytemuck::cast_slice(&words));
        self.queue
            .write_buffer(&self.param_buf, 0, bytemuck::bytes_of(&params));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("pack") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("pack"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            let groups_x = (2 * self.width).div_ceil(WORKGROUP_DIM) as u32;
            let groups_y = (2 * self.height).div_ceil(WORKGROUP_DIM) as u32;
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&self.out_buf, 0, &self.staging_buf, 0, self.out_bytes as u64);
        self.queue.submit(Some(encoder.finish()));

        let slice = self.staging_buf.slice(..);
        let (sender, receiver) = mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(GpuError::BufferRead("map callback dropped".into())),
        }
        let bytes = {
            let data = slice.get_mapped_range();
            data.to_vec().into_boxed_slice()
        };
        self.staging_buf.unmap();

        Ok(PackedFrame::from_boxed(bytes, 2 * self.width, 2 * self.height))
    }
}
