//! Vector, quaternion and hash types for scripts

use crate::core::hash::{hash_string32, hash_string64, Hash32, Hash64};
use glam::{Quat, Vec3, Vec4};
use rhai::{Engine, Module};
use tracing::debug;

/// Register math and hash types with the engine
pub fn register_math_types(engine: &mut Engine) {
    debug!("Registering math types");

    engine
        .register_type_with_name::<Vec3>("vector3")
        .register_get("x", |v: &mut Vec3| v.x as f64)
        .register_set("x", |v: &mut Vec3, x: f64| v.x = x as f32)
        .register_get("y", |v: &mut Vec3| v.y as f64)
        .register_set("y", |v: &mut Vec3, y: f64| v.y = y as f32)
        .register_get("z", |v: &mut Vec3| v.z as f64)
        .register_set("z", |v: &mut Vec3, z: f64| v.z = z as f32)
        .register_fn("+", |a: Vec3, b: Vec3| a + b)
        .register_fn("-", |a: Vec3, b: Vec3| a - b)
        .register_fn("-", |a: Vec3| -a)
        .register_fn("*", |a: Vec3, b: f64| a * b as f32)
        .register_fn("*", |a: f64, b: Vec3| b * a as f32)
        .register_fn("/", |a: Vec3, b: f64| a / b as f32)
        .register_fn("==", |a: &mut Vec3, b: Vec3| *a == b)
        .register_fn("!=", |a: &mut Vec3, b: Vec3| *a != b)
        .register_fn("to_string", |v: &mut Vec3| {
            format!("vector3({}, {}, {})", v.x, v.y, v.z)
        });

    engine
        .register_type_with_name::<Vec4>("vector4")
        .register_get("x", |v: &mut Vec4| v.x as f64)
        .register_set("x", |v: &mut Vec4, x: f64| v.x = x as f32)
        .register_get("y", |v: &mut Vec4| v.y as f64)
        .register_set("y", |v: &mut Vec4, y: f64| v.y = y as f32)
        .register_get("z", |v: &mut Vec4| v.z as f64)
        .register_set("z", |v: &mut Vec4, z: f64| v.z = z as f32)
        .register_get("w", |v: &mut Vec4| v.w as f64)
        .register_set("w", |v: &mut Vec4, w: f64| v.w = w as f32)
        .register_fn("+", |a: Vec4, b: Vec4| a + b)
        .register_fn("-", |a: Vec4, b: Vec4| a - b)
        .register_fn("*", |a: Vec4, b: f64| a * b as f32)
        .register_fn("==", |a: &mut Vec4, b: Vec4| *a == b)
        .register_fn("!=", |a: &mut Vec4, b: Vec4| *a != b)
        .register_fn("to_string", |v: &mut Vec4| {
            format!("vector4({}, {}, {}, {})", v.x, v.y, v.z, v.w)
        });

    engine
        .register_type_with_name::<Quat>("quat")
        .register_get("x", |q: &mut Quat| q.x as f64)
        .register_get("y", |q: &mut Quat| q.y as f64)
        .register_get("z", |q: &mut Quat| q.z as f64)
        .register_get("w", |q: &mut Quat| q.w as f64)
        .register_fn("*", |a: Quat, b: Quat| a * b)
        .register_fn("*", |a: Quat, b: Vec3| a * b)
        .register_fn("==", |a: &mut Quat, b: Quat| *a == b)
        .register_fn("!=", |a: &mut Quat, b: Quat| *a != b)
        .register_fn("to_string", |q: &mut Quat| {
            format!("quat({}, {}, {}, {})", q.x, q.y, q.z, q.w)
        });

    engine
        .register_type_with_name::<Hash64>("hash")
        .register_fn("==", |a: &mut Hash64, b: Hash64| *a == b)
        .register_fn("!=", |a: &mut Hash64, b: Hash64| *a != b)
        .register_fn("to_string", |h: &mut Hash64| format!("hash({h})"));

    engine
        .register_type_with_name::<Hash32>("hash32")
        .register_fn("==", |a: &mut Hash32, b: Hash32| *a == b)
        .register_fn("!=", |a: &mut Hash32, b: Hash32| *a != b)
        .register_fn("to_string", |h: &mut Hash32| format!("hash32({h})"));

    engine.register_fn("hash", |s: &str| hash_string64(s));
    engine.register_fn("hash32", |s: &str| hash_string32(s));

    engine.register_static_module("vmath", create_vmath_module().into());
}

/// `vmath::*` constructors and helpers
pub fn create_vmath_module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("vector3", || Ok(Vec3::ZERO));
    module.set_native_fn("vector3", |x: f64, y: f64, z: f64| {
        Ok(Vec3::new(x as f32, y as f32, z as f32))
    });
    module.set_native_fn("vector4", || Ok(Vec4::ZERO));
    module.set_native_fn("vector4", |x: f64, y: f64, z: f64, w: f64| {
        Ok(Vec4::new(x as f32, y as f32, z as f32, w as f32))
    });
    module.set_native_fn("quat", || Ok(Quat::IDENTITY));
    module.set_native_fn("quat", |x: f64, y: f64, z: f64, w: f64| {
        Ok(Quat::from_xyzw(x as f32, y as f32, z as f32, w as f32))
    });
    module.set_native_fn("quat_rotation_x", |angle: f64| Ok(Quat::from_rotation_x(angle as f32)));
    module.set_native_fn("quat_rotation_y", |angle: f64| Ok(Quat::from_rotation_y(angle as f32)));
    module.set_native_fn("quat_rotation_z", |angle: f64| Ok(Quat::from_rotation_z(angle as f32)));
    module.set_native_fn("quat_axis_angle", |axis: Vec3, angle: f64| {
        Ok(Quat::from_axis_angle(axis.normalize_or_zero(), angle as f32))
    });
    module.set_native_fn("length", |v: Vec3| Ok(v.length() as f64));
    module.set_native_fn("normalize", |v: Vec3| Ok(v.normalize_or_zero()));
    module.set_native_fn("dot", |a: Vec3, b: Vec3| Ok(a.dot(b) as f64));
    module.set_native_fn("cross", |a: Vec3, b: Vec3| Ok(a.cross(b)));
    module.set_native_fn("lerp", |t: f64, a: Vec3, b: Vec3| Ok(a.lerp(b, t as f32)));
    module.set_native_fn("slerp", |t: f64, a: Quat, b: Quat| Ok(a.slerp(b, t as f32)));
    module.set_native_fn("rotate", |q: Quat, v: Vec3| Ok(q * v));

    module
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        register_math_types(&mut engine);
        engine
    }

    #[test]
    fn test_vector_arithmetic() {
        let v: Vec3 = engine()
            .eval("vmath::vector3(1.0, 2.0, 3.0) + vmath::vector3(1.0, 1.0, 1.0) * 2.0")
            .unwrap();
        assert_eq!(v, Vec3::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn test_hash_equality() {
        let same: bool = engine().eval(r#"hash("player") == hash("player")"#).unwrap();
        let different: bool = engine().eval(r#"hash("player") == hash("enemy")"#).unwrap();
        assert!(same);
        assert!(!different);
    }

    #[test]
    fn test_quat_rotates_vector() {
        let v: Vec3 = engine()
            .eval("vmath::rotate(vmath::quat_rotation_z(3.141592653589793 / 2.0), vmath::vector3(1.0, 0.0, 0.0))")
            .unwrap();
        assert!((v - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    }
}
