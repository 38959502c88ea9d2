//! Window renderer
//!
//! [`SurfaceRenderer`] implements the core [`Renderer`] trait on top of a
//! [`RenderContext`]: each render batches the scene, uploads it and draws it
//! into the next surface texture.

use trellis_core::{Color, NodeKey, RenderError, Renderer, SceneGraph};
use crate::batch::SceneBatch;
use crate::context::RenderContext;
use crate::pipeline::MeshPipeline;

/// Clear color used when the scene declares no background
pub const DEFAULT_BACKGROUND: Color = Color::new(0.02, 0.02, 0.03);

/// GPU renderer drawing into a window surface
pub struct SurfaceRenderer {
    context: RenderContext,
    pipeline: MeshPipeline,
    batch: SceneBatch,
    pixel_ratio: f32,
    frames: u64,
}

impl SurfaceRenderer {
    pub fn new(context: RenderContext) -> Self {
        let size = (context.config.width, context.config.height);
        let pipeline = MeshPipeline::new(&context.device, context.config.format, size);
        Self {
            context,
            pipeline,
            batch: SceneBatch::new(),
            pixel_ratio: 1.0,
            frames: 0,
        }
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// Frames presented so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for SurfaceRenderer {
    fn render(&mut self, graph: &SceneGraph, scene: NodeKey, camera: NodeKey) -> Result<(), RenderError> {
        self.batch.collect(graph, scene, camera);
        self.pipeline.update_uniforms(&self.context.queue, &self.batch.uniforms);
        self.pipeline
            .upload_vertices(&self.context.device, &self.context.queue, &self.batch.vertices);

        let output = match self.context.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Err(RenderError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(e) => return Err(RenderError::Other(format!("{:?}", e))),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let bg = self.batch.background.unwrap_or(DEFAULT_BACKGROUND);
        self.pipeline.render(
            &mut encoder,
            &view,
            self.batch.vertex_count(),
            wgpu::Color {
                r: bg.r as f64,
                g: bg.g as f64,
                b: bg.b as f64,
                a: 1.0,
            },
        );

        self.context.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.frames += 1;
        Ok(())
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.context.resize(winit::dpi::PhysicalSize::new(width, height));
        self.pipeline
            .resize_depth(&self.context.device, self.context.config.width, self.context.config.height);
    }

    fn set_pixel_ratio(&mut self, dpr: f32) {
        self.pixel_ratio = dpr;
    }

    fn dispose(&mut self) {
        log::debug!("Disposing surface renderer after {} frames", self.frames);
        self.batch = SceneBatch::new();
    }
}
