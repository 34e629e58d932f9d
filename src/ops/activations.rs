/// Activation functions which take no parameters other than the slope used
/// for negative inputs by some backends.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ActivationKind {
    Relu,
    Relu6,
    Tanh,
    Sigmoid,
    HardSwish,
}

impl ActivationKind {
    /// Look up an activation by name.
    ///
    /// Both the TensorFlow Lite and Caffe spellings are accepted. Names must
    /// match exactly. Use [`normalized_token`] to extract the name from a
    /// node name such as `"Relu6-3"` first.
    pub fn from_name(name: &str) -> Option<ActivationKind> {
        let kind = match name {
            "Relu" | "ReLU" => ActivationKind::Relu,
            "Relu6" | "ReLU6" => ActivationKind::Relu6,
            "Tanh" | "TanH" => ActivationKind::Tanh,
            "Logistic" | "Sigmoid" => ActivationKind::Sigmoid,
            "HardSwish" => ActivationKind::HardSwish,
            _ => return None,
        };
        Some(kind)
    }

    /// Return the canonical name of this activation.
    pub fn name(self) -> &'static str {
        match self {
            ActivationKind::Relu => "Relu",
            ActivationKind::Relu6 => "Relu6",
            ActivationKind::Tanh => "Tanh",
            ActivationKind::Sigmoid => "Sigmoid",
            ActivationKind::HardSwish => "HardSwish",
        }
    }
}

/// Return the part of a node name which identifies the operator.
///
/// Imported nodes are named `"<op>-<index>"`. This returns the text before
/// the first `-`, or the whole name if there is none.
pub fn normalized_token(node_name: &str) -> &str {
    node_name
        .split_once('-')
        .map(|(token, _)| token)
        .unwrap_or(node_name)
}

/// Default value of [`Activation::alpha`].
const DEFAULT_ALPHA: f32 = 0.2;

#[derive(Clone, Debug, PartialEq)]
pub struct Activation {
    pub kind: ActivationKind,

    /// Slope for negative inputs. Only used by backends which implement the
    /// activation as a leaky variant.
    pub alpha: f32,
}

impl Activation {
    pub fn new(kind: ActivationKind) -> Activation {
        Activation {
            kind,
            alpha: DEFAULT_ALPHA,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeakyRelu {
    pub negative_slope: f32,
}

/// Leaky ReLU with a learned slope.
///
/// `slope` has either a single value shared by all channels or one value per
/// channel of the input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PRelu {
    pub slope: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use opgraph_testing::TestCases;

    use super::{Activation, ActivationKind, normalized_token};

    #[test]
    fn test_activation_kind_from_name() {
        #[derive(Debug)]
        struct Case {
            name: &'static str,
            expected: Option<ActivationKind>,
        }

        let cases = [
            Case {
                name: "Relu",
                expected: Some(ActivationKind::Relu),
            },
            Case {
                name: "ReLU6",
                expected: Some(ActivationKind::Relu6),
            },
            Case {
                name: "TanH",
                expected: Some(ActivationKind::Tanh),
            },
            Case {
                name: "Logistic",
                expected: Some(ActivationKind::Sigmoid),
            },
            Case {
                name: "HardSwish",
                expected: Some(ActivationKind::HardSwish),
            },
            // Prefixes of other names must not match.
            Case {
                name: "Relu64",
                expected: None,
            },
            Case {
                name: "Rel",
                expected: None,
            },
            Case {
                name: "HardSwishX",
                expected: None,
            },
            Case {
                name: "relu",
                expected: None,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(ActivationKind::from_name(case.name), case.expected);
        });
    }

    #[test]
    fn test_normalized_token() {
        assert_eq!(normalized_token("Relu6-3"), "Relu6");
        assert_eq!(normalized_token("HardSwish-0-extra"), "HardSwish");
        assert_eq!(normalized_token("Tanh"), "Tanh");
        assert_eq!(normalized_token(""), "");
        assert_eq!(
            ActivationKind::from_name(normalized_token("Logistic-12")),
            Some(ActivationKind::Sigmoid)
        );
    }

    #[test]
    fn test_activation_defaults() {
        let act = Activation::new(ActivationKind::Tanh);
        assert_eq!(act.alpha, 0.2);
        assert_eq!(act.kind.name(), "Tanh");
    }
}
