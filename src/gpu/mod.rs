//! wgpu renderer.
//!
//! One pipeline draws every cube in the scene. Vertex slot 0 holds cube
//! vertices (a shared per-color mesh, or a baked batch already in scene
//! space); slot 1 holds one world matrix per instance. Each frame the
//! composed draws are recorded into a [`FrameRecorder`], the instance
//! matrices are uploaded in one write, and the draws replay in a single
//! render pass.

mod camera;

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;
use winit::window::Window;

pub use camera::Camera;

use crate::batch::BatchSink;
use crate::compose::{compose, Canvas};
use crate::error::{BakeError, GpuError};
use crate::geometry::{CubeMesh, CubeVertex, Rgb};
use crate::session::Session;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SHADER_SOURCE: &str = include_str!("shader.wgsl");

/// Cornflower blue.
const CLEAR_COLOR: Rgb = Rgb::new(100, 149, 237);

/// Instances the instance buffer starts with; it doubles when outgrown.
const INITIAL_INSTANCE_CAPACITY: usize = 1024;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Instance {
    world: [[f32; 4]; 4],
}

impl From<Mat4> for Instance {
    fn from(world: Mat4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
        }
    }
}

/// A baked batch living in its own vertex buffer.
#[derive(Debug, Clone)]
pub struct GpuBatch {
    buffer: wgpu::Buffer,
    vertex_count: u32,
}

enum DrawCall {
    /// Consecutive draws of the same mesh, instanced.
    Mesh { mesh: CubeMesh, instances: Range<u32> },
    Batch { batch: GpuBatch, instance: u32 },
}

/// Collects one frame's draws in the order they were composed.
#[derive(Default)]
pub struct FrameRecorder {
    instances: Vec<Instance>,
    calls: Vec<DrawCall>,
}

impl FrameRecorder {
    fn push_instance(&mut self, world: Mat4) -> u32 {
        self.instances.push(world.into());
        (self.instances.len() - 1) as u32
    }
}

impl Canvas<GpuBatch> for FrameRecorder {
    fn draw_mesh(&mut self, mesh: &CubeMesh, world: Mat4) {
        let index = self.push_instance(world);
        if let Some(DrawCall::Mesh { mesh: last, instances }) = self.calls.last_mut() {
            if last.same_mesh(mesh) && instances.end == index {
                instances.end += 1;
                return;
            }
        }
        self.calls.push(DrawCall::Mesh {
            mesh: mesh.clone(),
            instances: index..index + 1,
        });
    }

    fn draw_batch(&mut self, batch: &GpuBatch, world: Mat4) {
        let instance = self.push_instance(world);
        self.calls.push(DrawCall::Batch {
            batch: batch.clone(),
            instance,
        });
    }
}

pub struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    render_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    depth_texture: wgpu::TextureView,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    mesh_buffers: HashMap<Rgb, wgpu::Buffer>,
    clear_color: wgpu::Color,
    pub camera: Camera,
}

impl GpuState {
    pub async fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture = create_depth_texture(&device, &config);

        let camera = Camera::new();
        let uniforms = Uniforms {
            view_proj: camera.view_proj(aspect(&config)).to_cols_array_2d(),
        };

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Bind Group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cube Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Cube Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<CubeVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Instance>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &wgpu::vertex_attr_array![
                            2 => Float32x4,
                            3 => Float32x4,
                            4 => Float32x4,
                            5 => Float32x4
                        ],
                    },
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let instance_buffer = create_instance_buffer(&device, INITIAL_INSTANCE_CAPACITY);

        let [r, g, b] = CLEAR_COLOR.to_f32().map(|c| (c as f64).powf(2.2));

        Ok(Self {
            surface,
            device,
            queue,
            config,
            render_pipeline,
            uniform_buffer,
            uniform_bind_group,
            depth_texture,
            instance_buffer,
            instance_capacity: INITIAL_INSTANCE_CAPACITY,
            mesh_buffers: HashMap::new(),
            clear_color: wgpu::Color { r, g, b, a: 1.0 },
            camera,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = create_depth_texture(&self.device, &self.config);
        }
    }

    /// Reconfigure the surface at its current size, e.g. after it was lost.
    pub fn reconfigure(&mut self) {
        self.resize(winit::dpi::PhysicalSize {
            width: self.config.width,
            height: self.config.height,
        });
    }

    fn update_uniforms(&mut self) {
        let uniforms = Uniforms {
            view_proj: self.camera.view_proj(aspect(&self.config)).to_cols_array_2d(),
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
    }

    fn upload_instances(&mut self, instances: &[Instance]) {
        if instances.len() > self.instance_capacity {
            let capacity = instances.len().next_power_of_two();
            self.instance_buffer.destroy();
            self.instance_buffer = create_instance_buffer(&self.device, capacity);
            self.instance_capacity = capacity;
            log::debug!("instance buffer grown to {} instances", capacity);
        }
        if !instances.is_empty() {
            self.queue
                .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(instances));
        }
    }

    fn ensure_mesh_buffer(&mut self, mesh: &CubeMesh) {
        let device = &self.device;
        self.mesh_buffers.entry(mesh.color()).or_insert_with(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Cube Mesh Buffer"),
                contents: bytemuck::cast_slice(mesh.vertices()),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
    }

    /// Compose and draw one frame of `session`.
    pub fn render(&mut self, session: &Session<GpuBatch>) -> Result<(), wgpu::SurfaceError> {
        let mut frame = FrameRecorder::default();
        compose(session, &mut frame);

        self.update_uniforms();
        self.upload_instances(&frame.instances);
        for call in &frame.calls {
            if let DrawCall::Mesh { mesh, .. } = call {
                self.ensure_mesh_buffer(mesh);
            }
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));

            for call in &frame.calls {
                match call {
                    DrawCall::Mesh { mesh, instances } => {
                        if let Some(buffer) = self.mesh_buffers.get(&mesh.color()) {
                            render_pass.set_vertex_buffer(0, buffer.slice(..));
                            render_pass.draw(0..mesh.vertices().len() as u32, instances.clone());
                        }
                    }
                    DrawCall::Batch { batch, instance } => {
                        render_pass.set_vertex_buffer(0, batch.buffer.slice(..));
                        render_pass.draw(0..batch.vertex_count, *instance..*instance + 1);
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

impl BatchSink for GpuState {
    type Handle = GpuBatch;

    fn create_batch(&mut self, vertices: &[CubeVertex]) -> Result<GpuBatch, BakeError> {
        let requested = std::mem::size_of_val(vertices) as u64;
        let limit = self.device.limits().max_buffer_size;
        if requested > limit {
            return Err(BakeError::CapacityExceeded { requested, limit });
        }
        let vertex_count = u32::try_from(vertices.len()).map_err(|_| BakeError::CapacityExceeded {
            requested,
            limit: u32::MAX as u64 * std::mem::size_of::<CubeVertex>() as u64,
        })?;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Baked Batch"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        if let Some(err) = out_of_memory.or(validation) {
            buffer.destroy();
            return Err(BakeError::Device(err.to_string()));
        }

        log::info!(
            "baked batch: {} vertices, {:.1} MiB",
            vertex_count,
            requested as f64 / (1024.0 * 1024.0)
        );
        Ok(GpuBatch {
            buffer,
            vertex_count,
        })
    }

    fn dispose_batch(&mut self, handle: GpuBatch) {
        handle.buffer.destroy();
    }
}

fn aspect(config: &wgpu::SurfaceConfiguration) -> f32 {
    config.width as f32 / config.height.max(1) as f32
}

fn create_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Instance Buffer"),
        size: (capacity * std::mem::size_of::<Instance>()) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_depth_texture(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
