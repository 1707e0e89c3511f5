//! Generated gRPC message and service types.
//!
//! The wire format itself is out of scope for the protocol logic (§6): this
//! module only wires the `prost`/`tonic` codegen output into the crate so
//! the rest of the code can treat the RPC surface as a typed, opaque
//! request/response channel.

pub mod twopc {
    tonic::include_proto!("twopc");
}

pub mod raft {
    tonic::include_proto!("raft");
}
