// shader.rs — Material lookup used by the world loader and precache
//
// The material system proper (script parsing, stages, programs) lives
// outside this crate. World loading only needs a handle per name plus the
// cull mode, surface flags and fog parameters behind it.

use std::collections::HashMap;

use bitflags::bitflags;
use xrq_common::q_shared::{com_strip_extension, Vec3};

bitflags! {
    /// Surface flags as written by the map compiler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceFlags: i32 {
        const NODAMAGE    = 0x1;
        const SLICK       = 0x2;
        const SKY         = 0x4;
        const LADDER      = 0x8;
        const NOIMPACT    = 0x10;
        const NOMARKS     = 0x20;
        const FLESH       = 0x40;
        const NODRAW      = 0x80;
        const HINT        = 0x100;
        const SKIP        = 0x200;
        const NOLIGHTMAP  = 0x400;
        const POINTLIGHT  = 0x800;
        const METALSTEPS  = 0x1000;
        const NOSTEPS     = 0x2000;
        const NONSOLID    = 0x4000;
        const LIGHTFILTER = 0x8000;
        const ALPHASHADOW = 0x10000;
        const NODLIGHT    = 0x20000;
        const DUST        = 0x40000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullType {
    #[default]
    FrontSided,
    BackSided,
    TwoSided,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FogParms {
    pub color: Vec3,
    pub depth_for_opaque: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shader {
    pub name: String,
    pub cull_type: CullType,
    pub surface_flags: SurfaceFlags,
    pub content_flags: i32,
    pub fog_parms: Option<FogParms>,
    /// Created on demand because no definition was registered.
    pub implicit: bool,
}

impl Shader {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_cull(mut self, cull_type: CullType) -> Self {
        self.cull_type = cull_type;
        self
    }

    pub fn with_flags(mut self, flags: SurfaceFlags) -> Self {
        self.surface_flags = flags;
        self
    }

    pub fn with_fog(mut self, fog: FogParms) -> Self {
        self.fog_parms = Some(fog);
        self
    }

    pub fn is_sky(&self) -> bool {
        self.surface_flags.contains(SurfaceFlags::SKY)
    }
}

/// Opaque index into the material system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderHandle(pub usize);

/// The material system as seen by the world loader.
pub trait ShaderLookup {
    /// Never fails; unknown names yield some usable shader.
    fn find_shader(&mut self, name: &str) -> ShaderHandle;

    fn shader(&self, handle: ShaderHandle) -> &Shader;

    fn default_shader(&self) -> ShaderHandle;
}

/// In-memory material table. Handle 0 is the default shader.
#[derive(Debug, Clone)]
pub struct ShaderRegistry {
    shaders: Vec<Shader>,
    by_name: HashMap<String, ShaderHandle>,
}

impl Default for ShaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn shader_key(name: &str) -> String {
    com_strip_extension(name).to_ascii_lowercase()
}

impl ShaderRegistry {
    pub const DEFAULT_NAME: &'static str = "<default>";

    pub fn new() -> Self {
        let mut reg = Self {
            shaders: Vec::new(),
            by_name: HashMap::new(),
        };
        reg.register(Shader::new(Self::DEFAULT_NAME));
        reg
    }

    /// Adds or replaces a definition.
    pub fn register(&mut self, shader: Shader) -> ShaderHandle {
        let key = shader_key(&shader.name);
        if let Some(&handle) = self.by_name.get(&key) {
            self.shaders[handle.0] = shader;
            return handle;
        }
        let handle = ShaderHandle(self.shaders.len());
        self.shaders.push(shader);
        self.by_name.insert(key, handle);
        handle
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}

impl ShaderLookup for ShaderRegistry {
    fn find_shader(&mut self, name: &str) -> ShaderHandle {
        if let Some(&handle) = self.by_name.get(&shader_key(name)) {
            return handle;
        }
        let mut shader = Shader::new(name);
        shader.implicit = true;
        self.register(shader)
    }

    fn shader(&self, handle: ShaderHandle) -> &Shader {
        self.shaders.get(handle.0).unwrap_or(&self.shaders[0])
    }

    fn default_shader(&self) -> ShaderHandle {
        ShaderHandle(0)
    }
}
