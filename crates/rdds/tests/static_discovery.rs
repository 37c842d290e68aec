// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! Static endpoint discovery at the participant API level.

use std::sync::Arc;

use rdds::discovery::{StaticEndpointInfo, WriterProxyData};
use rdds::qos::QosProfile;
use rdds::types::Guid;
use rdds::{EndpointAttributes, Error, ParticipantAttributes, RtpsParticipant};

fn static_participant(domain: u32) -> Arc<RtpsParticipant> {
    RtpsParticipant::new(ParticipantAttributes {
        domain_id: domain,
        use_static_edp: true,
        ..Default::default()
    })
    .expect("participant creation succeeds")
}

fn chat_attrs(user_defined_id: i16) -> EndpointAttributes {
    EndpointAttributes {
        topic_name: "Chat".into(),
        type_name: "String".into(),
        qos: QosProfile::reliable(),
        user_defined_id,
        ..Default::default()
    }
}

#[test]
fn zero_user_id_rejected_under_static_discovery() {
    let participant = static_participant(225);

    let err = participant
        .create_writer(chat_attrs(0), None)
        .expect_err("user_defined_id=0 must be rejected");
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = participant
        .create_reader(chat_attrs(-3), None)
        .expect_err("negative user id must be rejected");
    assert!(matches!(err, Error::InvalidArgument(_)));

    participant.shutdown();
}

#[test]
fn statically_declared_remote_writer_matches_local_reader() {
    let participant = static_participant(226);

    let reader = participant
        .create_reader(chat_attrs(1), None)
        .expect("reader created");

    // Declare the remote writer by user id, then activate it for a peer.
    let remote_writer = WriterProxyData {
        guid: Guid::new([0; 12], [0, 0, 9, 0x02]),
        topic_name: "Chat".into(),
        type_name: "String".into(),
        qos: QosProfile::reliable(),
        unicast_locators: Vec::new(),
        multicast_locators: Vec::new(),
    };
    participant
        .builtin()
        .edp
        .register_static_remote(StaticEndpointInfo {
            user_defined_id: 2,
            is_writer: true,
            writer_data: Some(remote_writer.clone()),
            reader_data: None,
        });

    let peer = Guid::new([8; 12], rdds::types::ENTITYID_PARTICIPANT);
    assert!(participant.new_remote_endpoint_discovered(peer, 2, true));
    assert!(!participant.new_remote_endpoint_discovered(peer, 99, true));

    let expected = Guid::new([8; 12], remote_writer.guid.entity_id);
    let role = reader.role.lock();
    if let rdds::rtps::EndpointRole::Reader(rdds::rtps::ReaderState::Stateful(r)) = &*role {
        assert!(r.is_matched_to(&expected));
    } else {
        panic!("expected stateful reader");
    }
    drop(role);

    participant.shutdown();
}

#[test]
fn activation_refused_with_dynamic_discovery() {
    let participant = RtpsParticipant::new(ParticipantAttributes {
        domain_id: 227,
        ..Default::default()
    })
    .expect("participant creation succeeds");

    let peer = Guid::new([8; 12], rdds::types::ENTITYID_PARTICIPANT);
    assert!(!participant.new_remote_endpoint_discovered(peer, 1, true));

    participant.shutdown();
}
