// THEORY (Density Color Transfer):
// Maps a normalized density `t` in [0, 1] to a display color. The transfer runs
// in HSV so brightness, saturation and hue can be shaped independently:
//
//   hue        = lerp(0.725, 1.16667, t³) mod 1   (violet, through red, to amber)
//   saturation = lerp(0.997, 0.6, t²)             (washes out towards the peak)
//   value      = lerp(0.6, 0.997, t)              (never fully black)
//
// The exponents and endpoints are perceptual tuning and must stay exact for
// images to match across runs.

pub mod color {
    pub type Density = f64;
    pub type Hue = f64;
    pub type Saturation = f64;
    pub type Value = f64;
    pub type Rgb8 = [u8; 3];

    const HUE_START: f64 = 0.725;
    const HUE_END: f64 = 1.16667;
    const SATURATION_START: f64 = 0.997;
    const SATURATION_END: f64 = 0.6;
    const VALUE_START: f64 = 0.6;
    const VALUE_END: f64 = 0.997;

    /// Linear interpolation with `t` clamped to [0, 1].
    pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        a + (b - a) * t
    }

    /// The HSV triple for a density value.
    pub fn density_to_hsv(t: Density) -> (Hue, Saturation, Value) {
        let hue = lerp(HUE_START, HUE_END, t.powi(3)) % 1.0;
        let saturation = lerp(SATURATION_START, SATURATION_END, t * t);
        let value = lerp(VALUE_START, VALUE_END, t);
        (hue, saturation, value)
    }

    /// HSV with every component in [0, 1] to linear RGB in [0, 1].
    pub fn hsv_to_rgb(hue: Hue, saturation: Saturation, value: Value) -> (f64, f64, f64) {
        if saturation <= 0.0 {
            return (value, value, value);
        }

        let scaled = hue.rem_euclid(1.0) * 6.0;
        let sector = scaled.floor();
        let fraction = scaled - sector;

        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * fraction);
        let t = value * (1.0 - saturation * (1.0 - fraction));

        match sector as u8 {
            0 => (value, t, p),
            1 => (q, value, p),
            2 => (p, value, t),
            3 => (p, q, value),
            4 => (t, p, value),
            _ => (value, p, q),
        }
    }

    fn to_byte(channel: f64) -> u8 {
        (channel.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    /// The 8-bit RGB color of a density value.
    pub fn density_to_rgb8(t: Density) -> Rgb8 {
        let (h, s, v) = density_to_hsv(t);
        let (r, g, b) = hsv_to_rgb(h, s, v);
        [to_byte(r), to_byte(g), to_byte(b)]
    }
}

#[cfg(test)]
mod tests {
    use super::color::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn zero_density_is_dim_violet() {
        let (h, s, v) = density_to_hsv(0.0);
        assert!(close(h, 0.725));
        assert!(close(s, 0.997));
        assert!(close(v, 0.6));

        let [r, g, b] = density_to_rgb8(0.0);
        assert!(b > r && r > g, "expected a blue-violet base, got {r},{g},{b}");
    }

    #[test]
    fn full_density_wraps_hue_past_red() {
        let (h, s, v) = density_to_hsv(1.0);
        assert!(close(h, 0.16667));
        assert!(close(s, 0.6));
        assert!(close(v, 0.997));
    }

    #[test]
    fn primary_hues_convert_exactly() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (1.0, 0.0, 0.0));
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0).1, 1.0);
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0).2, 1.0);
        assert_eq!(hsv_to_rgb(0.4, 0.0, 0.5), (0.5, 0.5, 0.5));
    }

    #[test]
    fn brightness_rises_with_density() {
        let brightness = |t: f64| {
            let [r, g, b] = density_to_rgb8(t);
            r.max(g).max(b)
        };
        assert!(brightness(0.0) < brightness(0.5));
        assert!(brightness(0.5) < brightness(0.996));
    }

    #[test]
    fn lerp_clamps_parameter() {
        assert_eq!(lerp(2.0, 4.0, -1.0), 2.0);
        assert_eq!(lerp(2.0, 4.0, 0.5), 3.0);
        assert_eq!(lerp(2.0, 4.0, 3.0), 4.0);
    }
}
