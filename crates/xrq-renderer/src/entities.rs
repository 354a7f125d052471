// entities.rs — Entity lump: worldspawn settings and static lights

use tracing::{info, warn};
use xrq_common::q_shared::{com_parse, parse_floats, Vec3};

use crate::model_types::{RefLight, RefLightType};

/// One `{ "key" "value" ... }` block, pairs in file order.
pub type EntityBlock = Vec<(String, String)>;

/// What the renderer takes from the entity lump.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityLump {
    pub grid_size: Vec3,
    /// (original, replacement) pairs from `remapshader` keys.
    pub remaps: Vec<(String, String)>,
    pub lights: Vec<RefLight>,
    pub num_entities: usize,
}

/// Splits an entity string into key/value blocks. Parsing stops with a
/// warning at the first malformed block.
pub fn parse_entity_blocks(text: &str) -> Vec<EntityBlock> {
    let mut blocks = Vec::new();
    let mut rest = Some(text);

    while let Some(data) = rest {
        let (token, next) = com_parse(data);
        rest = next;
        if rest.is_none() {
            // end of entities string
            break;
        }
        if token != "{" {
            warn!("expected {{ found '{}'", token);
            break;
        }

        let mut block = EntityBlock::new();
        let mut closed = false;
        while let Some(data) = rest {
            let (key, next) = com_parse(data);
            rest = next;
            if rest.is_none() {
                break;
            }
            if key == "}" {
                closed = true;
                break;
            }

            let Some(data) = rest else { break };
            let (value, next) = com_parse(data);
            rest = next;
            if rest.is_none() {
                break;
            }
            if value.is_empty() {
                continue;
            }
            block.push((key, value));
        }

        if !closed {
            warn!("EOF without closing bracket");
            blocks.push(block);
            break;
        }
        blocks.push(block);
    }

    blocks
}

fn classname(block: &EntityBlock) -> Option<&str> {
    block
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("classname"))
        .map(|(_, v)| v.as_str())
}

fn parse_vec3(key: &str, value: &str, out: &mut Vec3) {
    match parse_floats::<3>(value) {
        Some(v) => *out = v,
        None => warn!("bad vector '{}' for key '{}'", value, key),
    }
}

fn parse_scalar(key: &str, value: &str, out: &mut f32) {
    match value.trim().parse::<f32>() {
        Ok(v) => *out = v,
        Err(_) => warn!("bad number '{}' for key '{}'", value, key),
    }
}

/// Builds a light from a `light` entity's keys, applied in file order on
/// top of the defaults.
pub fn parse_light(block: &EntityBlock) -> RefLight {
    let mut light = RefLight::default();

    for (key, value) in block {
        let key = key.as_str();
        let is = |name: &str| key.eq_ignore_ascii_case(name);

        if is("origin") || is("light_origin") {
            parse_vec3(key, value, &mut light.origin);
        } else if is("light_center") {
            parse_vec3(key, value, &mut light.center);
        } else if is("_color") {
            parse_vec3(key, value, &mut light.color);
        } else if is("light_radius") {
            parse_vec3(key, value, &mut light.radius);
        } else if is("light_fovX") {
            parse_scalar(key, value, &mut light.fov_x);
            light.rl_type = RefLightType::Proj;
        } else if is("light_fovY") {
            parse_scalar(key, value, &mut light.fov_y);
            light.rl_type = RefLightType::Proj;
        } else if is("light_distance") {
            parse_scalar(key, value, &mut light.distance);
            light.rl_type = RefLightType::Proj;
        } else if is("light") || is("_light") {
            let mut r = light.radius[0];
            parse_scalar(key, value, &mut r);
            light.radius = [r; 3];
        } else if is("texture") {
            light.attenuation_shader = Some(value.clone());
        } else if is("rotation") || is("light_rotation") {
            match parse_floats::<9>(value) {
                Some(m) => {
                    light.axis = [[m[0], m[1], m[2]], [m[3], m[4], m[5]], [m[6], m[7], m[8]]];
                }
                None => warn!("bad rotation '{}'", value),
            }
        } else if is("noShadows") && value == "1" {
            light.no_shadows = true;
        }
    }

    light
}

/// Reads worldspawn settings and every `light` entity.
pub fn load_entities(text: &str, default_grid_size: Vec3) -> EntityLump {
    info!("...loading entities");

    let blocks = parse_entity_blocks(text);

    let mut lump = EntityLump {
        grid_size: default_grid_size,
        remaps: Vec::new(),
        lights: Vec::new(),
        num_entities: blocks.len(),
    };

    match blocks.first() {
        Some(world) => {
            for (key, value) in world {
                if key.starts_with("vertexremapshader") {
                    continue;
                }
                if key.starts_with("remapshader") {
                    match value.split_once(';') {
                        Some((from, to)) => lump.remaps.push((from.to_string(), to.to_string())),
                        None => warn!("no semi colon in shaderremap '{}'", value),
                    }
                    continue;
                }
                if key.eq_ignore_ascii_case("gridsize") {
                    parse_vec3(key, value, &mut lump.grid_size);
                    continue;
                }
                if key.eq_ignore_ascii_case("classname") && !value.eq_ignore_ascii_case("worldspawn") {
                    warn!("expected worldspawn found '{}'", value);
                }
            }
        }
        None => warn!("unexpected end of entities string while parsing worldspawn"),
    }

    let mut num_omni = 0;
    let mut num_proj = 0;
    for block in blocks.iter().skip(1) {
        if !classname(block).is_some_and(|c| c.eq_ignore_ascii_case("light")) {
            continue;
        }
        let light = parse_light(block);
        match light.rl_type {
            RefLightType::Omni => num_omni += 1,
            RefLightType::Proj => num_proj += 1,
        }
        lump.lights.push(light);
    }

    info!("{} total entities parsed", lump.num_entities);
    info!("{} total lights parsed", lump.lights.len());
    info!("{} omni-directional lights parsed", num_omni);
    info!("{} projective lights parsed", num_proj);

    lump
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_GRID: Vec3 = [64.0, 64.0, 128.0];

    const MAP_ENTITIES: &str = r#"
{
"classname" "worldspawn"
"message" "test map"
"gridsize" "32 32 64"
"remapshader" "textures/a;textures/b"
}
{
"classname" "light"
"origin" "10 20 30"
"light" "200"
"_color" "1 0.5 0"
}
// projective spot
{
"classname" "light"
"light_fovX" "60"
"light_distance" "512"
"noShadows" "1"
"rotation" "0 1 0 -1 0 0 0 0 1"
"texture" "lights/squarelight"
}
{
"classname" "info_player_start"
"origin" "0 0 0"
}
"#;

    #[test]
    fn test_parse_blocks() {
        let blocks = parse_entity_blocks(MAP_ENTITIES);
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0][1], ("message".to_string(), "test map".to_string()));
        assert_eq!(classname(&blocks[3]), Some("info_player_start"));
    }

    #[test]
    fn test_load_entities() {
        let lump = load_entities(MAP_ENTITIES, DEFAULT_GRID);
        assert_eq!(lump.num_entities, 4);
        assert_eq!(lump.grid_size, [32.0, 32.0, 64.0]);
        assert_eq!(lump.remaps, vec![("textures/a".to_string(), "textures/b".to_string())]);
        assert_eq!(lump.lights.len(), 2);

        let omni = &lump.lights[0];
        assert_eq!(omni.rl_type, RefLightType::Omni);
        assert_eq!(omni.origin, [10.0, 20.0, 30.0]);
        assert_eq!(omni.radius, [200.0; 3]);
        assert_eq!(omni.color, [1.0, 0.5, 0.0]);
        assert!(!omni.no_shadows);

        let proj = &lump.lights[1];
        assert_eq!(proj.rl_type, RefLightType::Proj);
        assert_eq!(proj.fov_x, 60.0);
        assert_eq!(proj.fov_y, 90.0);
        assert_eq!(proj.distance, 512.0);
        assert!(proj.no_shadows);
        assert_eq!(proj.axis[0], [0.0, 1.0, 0.0]);
        assert_eq!(proj.axis[1], [-1.0, 0.0, 0.0]);
        assert_eq!(proj.attenuation_shader.as_deref(), Some("lights/squarelight"));
    }

    #[test]
    fn test_light_defaults() {
        let light = parse_light(&vec![("classname".to_string(), "light".to_string())]);
        assert_eq!(light, RefLight::default());
        assert_eq!(light.radius, [300.0; 3]);
        assert_eq!(light.color, [1.0; 3]);
        assert_eq!(light.distance, 300.0);
    }

    #[test]
    fn test_every_light_entity_is_counted() {
        // keys never leak from one light into the next, and a bare light
        // entity still produces a light
        let text = r#"{ "classname" "worldspawn" }
            { "classname" "light" "light_distance" "100" }
            { "classname" "light" }
            { "classname" "LIGHT" "origin" "1 2 3" }"#;
        let lump = load_entities(text, DEFAULT_GRID);
        assert_eq!(lump.lights.len(), 3);
        assert_eq!(lump.lights[0].rl_type, RefLightType::Proj);
        assert_eq!(lump.lights[1].rl_type, RefLightType::Omni);
        assert_eq!(lump.lights[1].origin, [0.0; 3]);
        assert_eq!(lump.lights[2].origin, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_later_keys_override() {
        let block = vec![
            ("light_radius".to_string(), "10 20 30".to_string()),
            ("light".to_string(), "50".to_string()),
        ];
        assert_eq!(parse_light(&block).radius, [50.0; 3]);
    }

    #[test]
    fn test_malformed_entities() {
        let lump = load_entities("{ \"classname\" \"worldspawn\" } garbage { }", DEFAULT_GRID);
        assert_eq!(lump.num_entities, 1);
        assert_eq!(lump.grid_size, DEFAULT_GRID);

        let blocks = parse_entity_blocks("{ \"classname\" \"worldspawn\" \"gridsize\" ");
        assert_eq!(blocks.len(), 1);

        let lump = load_entities("", DEFAULT_GRID);
        assert_eq!(lump.num_entities, 0);
        assert!(lump.lights.is_empty());
    }

    #[test]
    fn test_bad_gridsize_keeps_default() {
        let lump = load_entities("{ \"classname\" \"worldspawn\" \"gridsize\" \"32 x\" }", DEFAULT_GRID);
        assert_eq!(lump.grid_size, DEFAULT_GRID);
    }
}
