//! Two-pole resonant low-pass filter coefficients.
//!
//! Coefficients are computed in floating point once per parameter change and
//! applied per sample in fixed point by the rendering kernels:
//!
//! `y[n] = (gain * x[n] + fb0 * y[n-1] + fb1 * y[n-2]) >> FILTER_SHIFT`
//!
//! The float/double mixing below follows the reference rounding so that
//! coefficients, and therefore rendered output, are bit-exact.

use crate::fixed::FILTER_SHIFT;

/// Cutoff values at or above this disable filtering for a voice.
pub const FILTER_BYPASS_CUTOFF: u8 = 0xfe;

/// Cutoff scale: 24 steps per octave over the 8-bit cutoff range.
const FREQ_PARAM_MULT: f32 = 128.0 / (24.0 * 256.0);

/// Lowest cutoff frequency in Hz (cutoff 0, before the quarter-octave offset).
const BASE_CUTOFF_HZ: f32 = 110.0;

/// Resonance damping per half-step of the 8-bit resonance parameter.
#[allow(clippy::excessive_precision)]
pub static RESONANCE_TABLE: [f32; 128] = [
    1.0000000000000000, 0.9786446094512940, 0.9577452540397644, 0.9372922182083130,
    0.9172759056091309, 0.8976871371269226, 0.8785166740417481, 0.8597555756568909,
    0.8413951396942139, 0.8234267830848694, 0.8058421611785889, 0.7886331081390381,
    0.7717915177345276, 0.7553095817565918, 0.7391796708106995, 0.7233941555023193,
    0.7079457640647888, 0.6928272843360901, 0.6780316829681397, 0.6635520458221436,
    0.6493816375732422, 0.6355138421058655, 0.6219421625137329, 0.6086603403091431,
    0.5956621170043945, 0.5829415321350098, 0.5704925656318665, 0.5583094954490662,
    0.5463865399360657, 0.5347182154655457, 0.5232990980148315, 0.5121238231658936,
    0.5011872053146362, 0.4904841780662537, 0.4800096750259399, 0.4697588682174683,
    0.4597269892692566, 0.4499093294143677, 0.4403013288974762, 0.4308985173702240,
    0.4216965138912201, 0.4126909971237183, 0.4038778245449066, 0.3952528536319733,
    0.3868120610713959, 0.3785515129566193, 0.3704673945903778, 0.3625559210777283,
    0.3548133969306946, 0.3472362160682678, 0.3398208320140839, 0.3325638175010681,
    0.3254617750644684, 0.3185114264488220, 0.3117094635963440, 0.3050527870655060,
    0.2985382676124573, 0.2921628654003143, 0.2859236001968384, 0.2798175811767578,
    0.2738419771194458, 0.2679939568042755, 0.2622708380222321, 0.2566699385643005,
    0.2511886358261108, 0.2458244115114212, 0.2405747324228287, 0.2354371547698975,
    0.2304092943668366, 0.2254888117313385, 0.2206734120845795, 0.2159608304500580,
    0.2113489061594009, 0.2068354636430740, 0.2024184018373489, 0.1980956792831421,
    0.1938652694225311, 0.1897251904010773, 0.1856735348701477, 0.1817083954811096,
    0.1778279393911362, 0.1740303486585617, 0.1703138649463654, 0.1666767448186874,
    0.1631172895431519, 0.1596338599920273, 0.1562248021364212, 0.1528885662555695,
    0.1496235728263855, 0.1464282870292664, 0.1433012634515762, 0.1402409970760346,
    0.1372461020946503, 0.1343151479959488, 0.1314467936754227, 0.1286396980285645,
    0.1258925348520279, 0.1232040524482727, 0.1205729842185974, 0.1179980933666229,
    0.1154781952500343, 0.1130121126770973, 0.1105986908078194, 0.1082368120551109,
    0.1059253737330437, 0.1036632955074310, 0.1014495193958283, 0.0992830246686935,
    0.0971627980470657, 0.0950878411531448, 0.0930572077631950, 0.0910699293017387,
    0.0891250967979431, 0.0872217938303947, 0.0853591337800026, 0.0835362523794174,
    0.0817523002624512, 0.0800064504146576, 0.0782978758215904, 0.0766257941722870,
    0.0749894231557846, 0.0733879879117012, 0.0718207582831383, 0.0702869966626167,
    0.0687859877943993, 0.0673170387744904, 0.0658794566988945, 0.0644725710153580,
];

/// Fixed-point filter coefficients (scaled by `1 << FILTER_SHIFT`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterCoefficients {
    /// Input gain (a0)
    pub gain: i32,
    /// First feedback tap (b0)
    pub fb0: i32,
    /// Second feedback tap (b1)
    pub fb1: i32,
}

/// Compute filter coefficients for a cutoff and resonance at `sample_rate`.
///
/// Both parameters are clamped to `0..=255`. The cutoff frequency is capped
/// at the Nyquist frequency. Identical inputs always give identical output.
pub fn filter_coefficients(sample_rate: u32, cutoff: i32, resonance: i32) -> FilterCoefficients {
    let cutoff = cutoff.clamp(0, 255);
    let resonance = resonance.clamp(0, 255);
    let fs = sample_rate as f32;

    let mut fc = BASE_CUTOFF_HZ * libm::powf(2.0, cutoff as f32 * FREQ_PARAM_MULT + 0.25);
    if fc > fs / 2.0 {
        fc = fs / 2.0;
    }

    let r = (f64::from(fs) / (2.0 * f64::from(core::f32::consts::PI) * f64::from(fc))) as f32;
    let damping = RESONANCE_TABLE[(resonance >> 1) as usize];
    let d = (f64::from(damping) * (f64::from(r) + 1.0) - 1.0) as f32;
    let e = r * r;

    let denom = 1.0 + f64::from(d) + f64::from(e);
    let fg = (1.0 / denom) as f32;
    let fb0 = (f64::from(d + e + e) / denom) as f32;
    let fb1 = (f64::from(-e) / denom) as f32;

    let scale = (1u32 << FILTER_SHIFT) as f32;
    FilterCoefficients {
        gain: (fg * scale) as i32,
        fb0: (fb0 * scale) as i32,
        fb1: (fb1 * scale) as i32,
    }
}
